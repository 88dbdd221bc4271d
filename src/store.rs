//! Local persistence: a small key-value table holding the invoice history,
//! the single draft slot and the app settings as JSON blobs.
//!
//! There is exactly one logical writer (the current user); a second app
//! instance racing the store is accepted, not guarded.

use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::invoice::model::Invoice;

/// History sequence, JSON-encoded `Vec<Invoice>`, most recent first.
pub const KEY_INVOICES: &str = "sakshi_invoices_v2";
/// Single draft slot, JSON-encoded `Invoice`, absent when no draft exists.
pub const KEY_DRAFT: &str = "sakshi_invoice_draft_v2";
/// Seller identity and logo, JSON-encoded `Settings`.
pub const KEY_SETTINGS: &str = "sakshi_settings_v1";

pub fn configure_store(conn: &Connection) -> Result<(), rusqlite::Error> {
    // Apply PRAGMAs on init (outside any transaction).
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;\n\
         PRAGMA synchronous = NORMAL;\n\
         PRAGMA temp_store = MEMORY;\n\
         PRAGMA busy_timeout = 5000;\n",
    )?;
    conn.busy_timeout(Duration::from_millis(5000))?;
    Ok(())
}

pub fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS app_meta (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn kv_get(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_meta WHERE key = ?1",
        params![key],
        |r| r.get(0),
    )
    .optional()
}

fn kv_set(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO app_meta(key, value) VALUES(?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

fn kv_delete(conn: &Connection, key: &str) -> Result<(), rusqlite::Error> {
    conn.execute("DELETE FROM app_meta WHERE key = ?1", params![key])?;
    Ok(())
}

/// Full persisted history, most recent first. An absent or malformed payload
/// reads as an empty sequence: rendering the dashboard must never fail
/// because of a bad blob.
pub fn list_invoices(conn: &Connection) -> Result<Vec<Invoice>, rusqlite::Error> {
    let raw = kv_get(conn, KEY_INVOICES)?;
    Ok(raw
        .and_then(|json| serde_json::from_str::<Vec<Invoice>>(&json).ok())
        .unwrap_or_default())
}

fn write_invoices(conn: &Connection, all: &[Invoice]) -> Result<(), rusqlite::Error> {
    let json = serde_json::to_string(all).unwrap_or_else(|_| "[]".to_string());
    kv_set(conn, KEY_INVOICES, &json)
}

/// Inserts at the front of the current persisted sequence (read-modify-write).
pub fn append_invoice(conn: &Connection, record: &Invoice) -> Result<(), rusqlite::Error> {
    let mut all = list_invoices(conn)?;
    all.insert(0, record.clone());
    write_invoices(conn, &all)
}

/// Removes the record at `index` from the current persisted sequence.
/// An out-of-bounds index is a no-op returning `false`.
pub fn delete_invoice_at(conn: &Connection, index: usize) -> Result<bool, rusqlite::Error> {
    let mut all = list_invoices(conn)?;
    if index >= all.len() {
        return Ok(false);
    }
    all.remove(index);
    write_invoices(conn, &all)?;
    Ok(true)
}

pub fn clear_invoices(conn: &Connection) -> Result<(), rusqlite::Error> {
    kv_delete(conn, KEY_INVOICES)
}

/// Overwrites the single draft slot wholesale.
pub fn save_draft(conn: &Connection, record: &Invoice) -> Result<(), rusqlite::Error> {
    let json = serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string());
    kv_set(conn, KEY_DRAFT, &json)
}

/// `None` when no draft is stored or the stored payload is corrupt.
pub fn load_draft(conn: &Connection) -> Result<Option<Invoice>, rusqlite::Error> {
    let raw = kv_get(conn, KEY_DRAFT)?;
    Ok(raw.and_then(|json| serde_json::from_str::<Invoice>(&json).ok()))
}

/// Explicit deletion; the key is removed, so a stale draft can never
/// resurface on a later load.
pub fn clear_draft(conn: &Connection) -> Result<(), rusqlite::Error> {
    kv_delete(conn, KEY_DRAFT)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub address_line: String,
    #[serde(default)]
    pub gstin: String,
    #[serde(default)]
    pub phone: String,
    /// Uploaded logo as a `data:image/*;base64,` URL, shown in the form
    /// header and embedded into exported PDFs. Empty when no logo is set.
    #[serde(default)]
    pub logo_data_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub address_line: Option<String>,
    #[serde(default)]
    pub gstin: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub logo_data_url: Option<String>,
}

/// Absent or corrupt settings read as defaults.
pub fn read_settings(conn: &Connection) -> Result<Settings, rusqlite::Error> {
    let raw = kv_get(conn, KEY_SETTINGS)?;
    Ok(raw
        .and_then(|json| serde_json::from_str::<Settings>(&json).ok())
        .unwrap_or_default())
}

pub fn write_settings(conn: &Connection, settings: &Settings) -> Result<(), rusqlite::Error> {
    let json = serde_json::to_string(settings).unwrap_or_else(|_| "{}".to_string());
    kv_set(conn, KEY_SETTINGS, &json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::model::{materialize_invoice, InvoiceFormState, LineItem};

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn sample_invoice(bill_no: &str) -> Invoice {
        let form = InvoiceFormState {
            bill_no: bill_no.to_string(),
            customer: "Mehta Traders".to_string(),
            rows: vec![LineItem {
                description: "Copper wire".to_string(),
                qty: 2.0,
                rate: 100.0,
                sgst_pct: 9.0,
                cgst_pct: 9.0,
                ..Default::default()
            }],
            ..Default::default()
        };
        materialize_invoice(&form)
    }

    #[test]
    fn empty_store_lists_nothing() {
        let conn = test_conn();
        assert!(list_invoices(&conn).unwrap().is_empty());
    }

    #[test]
    fn append_inserts_at_front() {
        let conn = test_conn();
        let first = sample_invoice("SB-1");
        let second = sample_invoice("SB-2");

        append_invoice(&conn, &first).unwrap();
        append_invoice(&conn, &second).unwrap();

        let all = list_invoices(&conn).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], second);
        assert_eq!(all[1], first);
    }

    #[test]
    fn delete_at_zero_after_one_append_yields_empty() {
        let conn = test_conn();
        append_invoice(&conn, &sample_invoice("SB-1")).unwrap();

        assert!(delete_invoice_at(&conn, 0).unwrap());
        assert!(list_invoices(&conn).unwrap().is_empty());
    }

    #[test]
    fn delete_out_of_bounds_is_a_noop() {
        let conn = test_conn();
        append_invoice(&conn, &sample_invoice("SB-1")).unwrap();

        assert!(!delete_invoice_at(&conn, 5).unwrap());
        assert_eq!(list_invoices(&conn).unwrap().len(), 1);
    }

    #[test]
    fn delete_operates_on_current_persisted_sequence() {
        let conn = test_conn();
        append_invoice(&conn, &sample_invoice("SB-1")).unwrap();
        append_invoice(&conn, &sample_invoice("SB-2")).unwrap();
        append_invoice(&conn, &sample_invoice("SB-3")).unwrap();

        assert!(delete_invoice_at(&conn, 1).unwrap());
        let all = list_invoices(&conn).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].bill_no, "SB-3");
        assert_eq!(all[1].bill_no, "SB-1");
    }

    #[test]
    fn clear_empties_history_of_any_size() {
        let conn = test_conn();
        for i in 0..4 {
            append_invoice(&conn, &sample_invoice(&format!("SB-{i}"))).unwrap();
        }
        clear_invoices(&conn).unwrap();
        assert!(list_invoices(&conn).unwrap().is_empty());
    }

    #[test]
    fn malformed_history_payload_reads_as_empty() {
        let conn = test_conn();
        kv_set(&conn, KEY_INVOICES, "{not json[").unwrap();
        assert!(list_invoices(&conn).unwrap().is_empty());

        // And appending afterwards starts a fresh sequence.
        append_invoice(&conn, &sample_invoice("SB-1")).unwrap();
        assert_eq!(list_invoices(&conn).unwrap().len(), 1);
    }

    #[test]
    fn draft_slot_overwrites_wholesale() {
        let conn = test_conn();
        assert!(load_draft(&conn).unwrap().is_none());

        let first = sample_invoice("SB-1");
        let second = sample_invoice("SB-2");
        save_draft(&conn, &first).unwrap();
        save_draft(&conn, &second).unwrap();

        assert_eq!(load_draft(&conn).unwrap().unwrap(), second);
    }

    #[test]
    fn cleared_draft_does_not_resurface() {
        let conn = test_conn();
        save_draft(&conn, &sample_invoice("SB-1")).unwrap();
        clear_draft(&conn).unwrap();
        assert!(load_draft(&conn).unwrap().is_none());
    }

    #[test]
    fn corrupt_draft_reads_as_absent() {
        let conn = test_conn();
        kv_set(&conn, KEY_DRAFT, "42").unwrap();
        assert!(load_draft(&conn).unwrap().is_none());
    }

    #[test]
    fn settings_round_trip_and_default() {
        let conn = test_conn();
        assert_eq!(read_settings(&conn).unwrap(), Settings::default());

        let settings = Settings {
            company_name: "Sakshi Enterprises".to_string(),
            gstin: "27AAACS1234A1Z5".to_string(),
            ..Default::default()
        };
        write_settings(&conn, &settings).unwrap();
        assert_eq!(read_settings(&conn).unwrap(), settings);

        kv_set(&conn, KEY_SETTINGS, "][").unwrap();
        assert_eq!(read_settings(&conn).unwrap(), Settings::default());
    }
}
