use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use serde::Serialize;
use tauri::Manager;

mod invoice;
mod pdf;
mod store;

use invoice::model::{
    apply_invoice, materialize_invoice, Invoice, InvoiceFormInput, InvoiceFormState, LineItem,
    LineItemInput,
};
use invoice::totals::{compute_totals, format_currency};
use invoice::words::number_to_words;
use store::{Settings, SettingsPatch};

fn sqlite_error_string(err: &rusqlite::Error) -> String {
    match err {
        rusqlite::Error::SqliteFailure(code, msg) => {
            let message = msg.clone().unwrap_or_else(|| "".to_string());
            format!(
                "sqlite(code={:?}, extended_code={}, msg={})",
                code.code, code.extended_code, message
            )
        }
        other => other.to_string(),
    }
}

fn resolve_db_path(app: &tauri::AppHandle) -> Result<PathBuf, String> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Ok(dir) = app.path().app_data_dir() {
        candidates.push(dir.join("sakshi-invoice.db"));
    }
    if let Ok(dir) = app.path().app_local_data_dir() {
        candidates.push(dir.join("sakshi-invoice.db"));
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            candidates.push(dir.join("sakshi-invoice.db"));
        }
    }
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join("sakshi-invoice.db"));
    }

    for path in candidates {
        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                continue;
            }
        }
        return Ok(path);
    }

    Err("Could not resolve a writable location for the invoice database.".to_string())
}

#[derive(Clone)]
struct DbState {
    conn: Arc<Mutex<Connection>>,
    write_lock: Arc<Mutex<()>>,
}

impl DbState {
    fn new(app: &tauri::AppHandle) -> Result<Self, String> {
        let path = resolve_db_path(app)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        let conn = Connection::open(path).map_err(|e| e.to_string())?;
        store::configure_store(&conn).map_err(|e| e.to_string())?;
        store::init_schema(&conn).map_err(|e| e.to_string())?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    async fn with_read<T, F>(&self, op_name: &'static str, f: F) -> Result<T, String>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        let conn = self.conn.clone();
        tauri::async_runtime::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| "db mutex poisoned".to_string())?;
            f(&guard).map_err(|e| {
                let msg = sqlite_error_string(&e);
                eprintln!("[sqlite] {{ op: {:?}, error: {:?} }}", op_name, msg);
                msg
            })
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn with_write<T, F>(&self, op_name: &'static str, f: F) -> Result<T, String>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        let conn = self.conn.clone();
        let write_lock = self.write_lock.clone();
        tauri::async_runtime::spawn_blocking(move || {
            let _wg = write_lock.lock().map_err(|_| "write mutex poisoned".to_string())?;
            let guard = conn.lock().map_err(|_| "db mutex poisoned".to_string())?;
            f(&guard).map_err(|e| {
                let msg = sqlite_error_string(&e);
                eprintln!("[sqlite] {{ op: {:?}, error: {:?} }}", op_name, msg);
                msg
            })
        })
        .await
        .map_err(|e| e.to_string())?
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineDisplay {
    pub sgst_amt: String,
    pub cgst_amt: String,
    pub amount: String,
}

/// Ready-to-render recalc result: the UI layer does no arithmetic and no
/// formatting of its own.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalsDisplay {
    pub per_line: Vec<LineDisplay>,
    pub subtotal: String,
    pub total_sgst: String,
    pub total_cgst: String,
    pub grand_total: String,
    pub amount_words: String,
}

fn totals_display(rows: &[LineItem]) -> TotalsDisplay {
    let totals = compute_totals(rows);
    TotalsDisplay {
        per_line: totals
            .per_line
            .iter()
            .map(|line| LineDisplay {
                sgst_amt: format_currency(line.sgst_amt),
                cgst_amt: format_currency(line.cgst_amt),
                amount: format_currency(line.amount),
            })
            .collect(),
        subtotal: format_currency(totals.subtotal),
        total_sgst: format_currency(totals.total_sgst),
        total_cgst: format_currency(totals.total_cgst),
        grand_total: format_currency(totals.grand_total),
        amount_words: number_to_words(totals.grand_total),
    }
}

/// Recomputes every displayed amount for the current rows. Invoked by the UI
/// on each edit; pure, so it takes no state.
#[tauri::command]
fn recalc_invoice(rows: Vec<LineItemInput>) -> TotalsDisplay {
    let rows: Vec<LineItem> = rows.iter().map(LineItem::from_input).collect();
    totals_display(&rows)
}

/// Snapshots the live form into an immutable record (stamps `createdAt`).
#[tauri::command]
fn materialize_invoice_snapshot(form: InvoiceFormInput) -> Invoice {
    materialize_invoice(&InvoiceFormState::from_input(&form))
}

#[tauri::command]
async fn save_invoice(
    state: tauri::State<'_, DbState>,
    form: InvoiceFormInput,
) -> Result<Invoice, String> {
    let record = materialize_invoice(&InvoiceFormState::from_input(&form));
    let created = record.clone();
    state
        .with_write("save_invoice", move |conn| {
            store::append_invoice(conn, &record)
        })
        .await?;
    Ok(created)
}

#[tauri::command]
async fn get_all_invoices(state: tauri::State<'_, DbState>) -> Result<Vec<Invoice>, String> {
    state
        .with_read("get_all_invoices", |conn| store::list_invoices(conn))
        .await
}

/// Loads the history record at `index` back into editable form state.
#[tauri::command]
async fn open_invoice(
    state: tauri::State<'_, DbState>,
    index: usize,
) -> Result<Option<InvoiceFormState>, String> {
    state
        .with_read("open_invoice", move |conn| {
            let all = store::list_invoices(conn)?;
            Ok(all.get(index).map(apply_invoice))
        })
        .await
}

#[tauri::command]
async fn delete_invoice_at(
    state: tauri::State<'_, DbState>,
    index: usize,
) -> Result<bool, String> {
    state
        .with_write("delete_invoice_at", move |conn| {
            store::delete_invoice_at(conn, index)
        })
        .await
}

#[tauri::command]
async fn clear_history(state: tauri::State<'_, DbState>) -> Result<bool, String> {
    state
        .with_write("clear_history", |conn| {
            store::clear_invoices(conn)?;
            Ok(true)
        })
        .await
}

#[tauri::command]
async fn save_draft(
    state: tauri::State<'_, DbState>,
    form: InvoiceFormInput,
) -> Result<bool, String> {
    let record = materialize_invoice(&InvoiceFormState::from_input(&form));
    state
        .with_write("save_draft", move |conn| {
            store::save_draft(conn, &record)?;
            Ok(true)
        })
        .await
}

/// Offered for restore on startup; non-destructive, the draft slot survives
/// until overwritten or explicitly cleared.
#[tauri::command]
async fn load_draft(
    state: tauri::State<'_, DbState>,
) -> Result<Option<InvoiceFormState>, String> {
    state
        .with_read("load_draft", |conn| {
            Ok(store::load_draft(conn)?.as_ref().map(apply_invoice))
        })
        .await
}

#[tauri::command]
async fn clear_draft(state: tauri::State<'_, DbState>) -> Result<bool, String> {
    state
        .with_write("clear_draft", |conn| {
            store::clear_draft(conn)?;
            Ok(true)
        })
        .await
}

#[tauri::command]
async fn get_settings(state: tauri::State<'_, DbState>) -> Result<Settings, String> {
    state
        .with_read("get_settings", |conn| store::read_settings(conn))
        .await
}

/// Patch-style settings update; the logo-replace flow arrives here as a
/// `logoDataUrl` produced by the UI's file reader.
#[tauri::command]
async fn update_settings(
    state: tauri::State<'_, DbState>,
    patch: SettingsPatch,
) -> Result<Settings, String> {
    state
        .with_write("update_settings", move |conn| {
            let mut current = store::read_settings(conn)?;

            if let Some(v) = patch.company_name {
                current.company_name = v;
            }
            if let Some(v) = patch.address_line {
                current.address_line = v;
            }
            if let Some(v) = patch.gstin {
                current.gstin = v;
            }
            if let Some(v) = patch.phone {
                current.phone = v;
            }
            if let Some(v) = patch.logo_data_url {
                current.logo_data_url = v;
            }

            store::write_settings(conn, &current)?;
            Ok(current)
        })
        .await
}

/// Renders the record to PDF and writes `Invoice_<billNo-or-timestamp>.pdf`
/// into the OS Downloads directory. Exporting the live form passes
/// `save_to_history = true` so the record lands in history in the same user
/// action; re-downloads from the dashboard pass `false`. A failure anywhere
/// surfaces as one error and nothing is appended.
#[tauri::command]
async fn export_invoice_pdf_to_downloads(
    state: tauri::State<'_, DbState>,
    app: tauri::AppHandle,
    record: Invoice,
    save_to_history: bool,
) -> Result<String, String> {
    let settings = state
        .with_read("export_invoice_pdf_settings", |conn| {
            store::read_settings(conn)
        })
        .await?;

    let bytes = pdf::generate_pdf_bytes(&record, &settings)?;

    let downloads_dir = app.path().download_dir().map_err(|e| e.to_string())?;
    let full_path = downloads_dir.join(pdf::invoice_pdf_filename(&record));
    std::fs::write(&full_path, bytes).map_err(|e| e.to_string())?;

    if save_to_history {
        state
            .with_write("export_invoice_pdf_save", move |conn| {
                store::append_invoice(conn, &record)
            })
            .await?;
    }

    Ok(full_path.to_string_lossy().to_string())
}

#[tauri::command]
fn quit_app(app: tauri::AppHandle) {
    app.exit(0);
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        .setup(|app| {
            let handle = app.handle();
            let db = DbState::new(&handle)?;
            app.manage(db);
            Ok(())
        })
        .plugin(tauri_plugin_dialog::init())
        .plugin(tauri_plugin_opener::init())
        .invoke_handler(tauri::generate_handler![
            quit_app,
            recalc_invoice,
            materialize_invoice_snapshot,
            save_invoice,
            get_all_invoices,
            open_invoice,
            delete_invoice_at,
            clear_history,
            save_draft,
            load_draft,
            clear_draft,
            get_settings,
            update_settings,
            export_invoice_pdf_to_downloads
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
