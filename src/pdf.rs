//! A4 invoice rendering with printpdf.
//!
//! Text widths are measured with ttf-parser against the same embedded face so
//! numeric columns right-align exactly. The items table paginates by cursor:
//! a row that does not fit above the bottom margin starts a new page with the
//! table header repeated, so a trailing blank page cannot occur.

use std::io::Cursor;
use std::path::PathBuf;

use base64::Engine as _;
use printpdf::{Image, ImageTransform, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference};
use time::OffsetDateTime;

use crate::invoice::model::Invoice;
use crate::invoice::totals::{compute_totals, format_currency};
use crate::invoice::words::number_to_words;
use crate::store::Settings;

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const PAGE_MARGIN_X: f32 = 15.0;
const PAGE_MARGIN_TOP: f32 = 12.0;
const PAGE_MARGIN_BOTTOM: f32 = 14.0;

const LOGO_DPI: f32 = 300.0;
const LOGO_AREA_W: f32 = 48.0;
const LOGO_MAX_H: f32 = 24.0;

const LINE_H: f32 = 4.2;
const TEXT_SIZE: f32 = 8.5;
const HEADER_SIZE: f32 = 8.6;

fn font_candidates() -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            candidates.push(dir.join("assets").join("DejaVuSans.ttf"));
        }
    }
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join("assets").join("DejaVuSans.ttf"));
    }
    candidates.push(PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"));
    candidates.push(PathBuf::from("/usr/share/fonts/dejavu/DejaVuSans.ttf"));
    candidates.push(PathBuf::from("/usr/share/fonts/TTF/DejaVuSans.ttf"));
    candidates.push(PathBuf::from("/Library/Fonts/DejaVuSans.ttf"));
    candidates.push(PathBuf::from("C:\\Windows\\Fonts\\DejaVuSans.ttf"));

    candidates
}

// The ₹ glyph needs a Unicode face; the builtin PDF fonts cannot render it.
fn load_font_bytes() -> Result<Vec<u8>, String> {
    for path in font_candidates() {
        if let Ok(bytes) = std::fs::read(&path) {
            if !bytes.is_empty() {
                return Ok(bytes);
            }
        }
    }
    Err("No embeddable Unicode font found (looked for DejaVuSans.ttf in app assets and system font directories).".to_string())
}

fn push_line(
    layer: &PdfLayerReference,
    font: &printpdf::IndirectFontRef,
    text: &str,
    font_size: f32,
    x: f32,
    y: f32,
) {
    layer.use_text(text, font_size, Mm(x), Mm(y), font);
}

fn text_width_mm(face: &ttf_parser::Face<'_>, text: &str, font_size_pt: f32) -> f32 {
    // PDF font sizes are in points; our coordinates are in millimeters.
    const PT_TO_MM: f32 = 25.4 / 72.0;
    let units_per_em = face.units_per_em() as f32;
    if units_per_em <= 0.0 {
        return 0.0;
    }

    let mut width_units: i32 = 0;
    for ch in text.chars() {
        let Some(gid) = face.glyph_index(ch) else {
            continue;
        };
        width_units += face.glyph_hor_advance(gid).unwrap_or(0) as i32;
    }

    let width_pt = (width_units as f32 / units_per_em) * font_size_pt;
    width_pt * PT_TO_MM
}

fn push_line_right(
    layer: &PdfLayerReference,
    font: &printpdf::IndirectFontRef,
    face: &ttf_parser::Face<'_>,
    text: &str,
    font_size: f32,
    x_right: f32,
    y: f32,
) {
    let width_mm = text_width_mm(face, text, font_size);
    let x = (x_right - width_mm).max(0.0);
    push_line(layer, font, text, font_size, x, y);
}

fn push_line_center(
    layer: &PdfLayerReference,
    font: &printpdf::IndirectFontRef,
    face: &ttf_parser::Face<'_>,
    text: &str,
    font_size: f32,
    x_center: f32,
    y: f32,
) {
    let width_mm = text_width_mm(face, text, font_size);
    let x = (x_center - width_mm / 2.0).max(0.0);
    push_line(layer, font, text, font_size, x, y);
}

fn draw_rule(layer: &PdfLayerReference, x1: f32, x2: f32, y: f32, thickness: f32) {
    layer.set_outline_thickness(thickness);
    layer.add_line(printpdf::Line {
        points: vec![
            (printpdf::Point::new(Mm(x1), Mm(y)), false),
            (printpdf::Point::new(Mm(x2), Mm(y)), false),
        ],
        is_closed: false,
    });
}

fn wrap_text_by_width_mm(
    face: &ttf_parser::Face<'_>,
    input: &str,
    font_size: f32,
    max_width_mm: f32,
) -> Vec<String> {
    let s = input.trim();
    if s.is_empty() {
        return Vec::new();
    }

    // Splits a single over-long word into width-bounded chunks.
    fn push_chunks(
        face: &ttf_parser::Face<'_>,
        word: &str,
        font_size: f32,
        max_width_mm: f32,
        out: &mut Vec<String>,
    ) -> String {
        let mut chunk = String::new();
        for ch in word.chars() {
            let candidate = format!("{}{}", chunk, ch);
            if text_width_mm(face, &candidate, font_size) <= max_width_mm {
                chunk = candidate;
            } else {
                if !chunk.is_empty() {
                    out.push(chunk);
                }
                chunk = ch.to_string();
            }
        }
        chunk
    }

    let mut out: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in s.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };

        if text_width_mm(face, &candidate, font_size) <= max_width_mm {
            current = candidate;
            continue;
        }

        if !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }

        if text_width_mm(face, word, font_size) <= max_width_mm {
            current.push_str(word);
        } else {
            current = push_chunks(face, word, font_size, max_width_mm, &mut out);
        }
    }

    if !current.is_empty() {
        out.push(current);
    }

    out
}

// Decode a data URL logo (as stored from the UI: data:image/*;base64,...) into an image.
fn decode_logo_data_url(logo_data_url: &str) -> Option<printpdf::image_crate::DynamicImage> {
    let s = logo_data_url.trim();
    if s.is_empty() {
        return None;
    }
    let lower = s.to_ascii_lowercase();
    if !lower.starts_with("data:") {
        return None;
    }
    let comma = s.find(',')?;
    let (meta, data) = s.split_at(comma);
    if !meta.to_ascii_lowercase().contains(";base64") {
        return None;
    }
    let b64 = &data[1..];
    let bytes = base64::engine::general_purpose::STANDARD.decode(b64).ok()?;
    printpdf::image_crate::load_from_memory(&bytes).ok()
}

// Right-anchored column edges of the items table.
struct ItemColumns {
    desc_x: f32,
    desc_w: f32,
    hsn_cx: f32,
    qty_cx: f32,
    unit_cx: f32,
    rate_right: f32,
    amount_right: f32,
}

fn item_columns() -> ItemColumns {
    let content_right = PAGE_W - PAGE_MARGIN_X;
    let col_gap = 3.0;
    let amount_w = 28.0;
    let rate_w = 24.0;
    let unit_w = 14.0;
    let qty_w = 14.0;
    let hsn_w = 18.0;

    let amount_right = content_right;
    let rate_right = amount_right - amount_w - col_gap;
    let unit_right = rate_right - rate_w - col_gap;
    let qty_right = unit_right - unit_w - col_gap;
    let hsn_right = qty_right - qty_w - col_gap;
    let desc_right = hsn_right - hsn_w - col_gap;

    ItemColumns {
        desc_x: PAGE_MARGIN_X,
        desc_w: desc_right - PAGE_MARGIN_X,
        hsn_cx: hsn_right - hsn_w / 2.0,
        qty_cx: qty_right - qty_w / 2.0,
        unit_cx: unit_right - unit_w / 2.0,
        rate_right,
        amount_right,
    }
}

fn draw_items_header(
    layer: &PdfLayerReference,
    font: &printpdf::IndirectFontRef,
    face: &ttf_parser::Face<'_>,
    cols: &ItemColumns,
    y: f32,
) -> f32 {
    let content_right = PAGE_W - PAGE_MARGIN_X;
    draw_rule(layer, PAGE_MARGIN_X, content_right, y, 0.6);
    let y = y - 5.0;

    push_line(layer, font, "Description", HEADER_SIZE, cols.desc_x, y);
    push_line_center(layer, font, face, "HSN", HEADER_SIZE, cols.hsn_cx, y);
    push_line_center(layer, font, face, "Qty", HEADER_SIZE, cols.qty_cx, y);
    push_line_center(layer, font, face, "Unit", HEADER_SIZE, cols.unit_cx, y);
    push_line_right(layer, font, face, "Rate", HEADER_SIZE, cols.rate_right, y);
    push_line_right(layer, font, face, "Amount", HEADER_SIZE, cols.amount_right, y);

    let y = y - 2.4;
    draw_rule(layer, PAGE_MARGIN_X, content_right, y, 0.6);
    y - 5.2
}

// Quantities print without forced decimals ("2", "1.5"), matching the form.
fn format_qty(v: f64) -> String {
    let s = format!("{:.6}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() {
        "0".to_string()
    } else {
        s.to_string()
    }
}

fn new_page(doc: &PdfDocumentReference) -> PdfLayerReference {
    let (page, layer) = doc.add_page(Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
    doc.get_page(page).get_layer(layer)
}

/// Renders the invoice as a single-column A4 document: seller header with
/// optional logo, bill meta block, paginated items table, totals box and the
/// amount-in-words line.
pub fn generate_pdf_bytes(record: &Invoice, settings: &Settings) -> Result<Vec<u8>, String> {
    let font_bytes = load_font_bytes()?;
    let face = ttf_parser::Face::parse(&font_bytes, 0)
        .map_err(|_| "Failed to parse embedded font for measurement".to_string())?;

    let (doc, page1, layer1) = PdfDocument::new("Invoice", Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
    let font = doc
        .add_external_font(Cursor::new(font_bytes.clone()))
        .map_err(|e| e.to_string())?;
    // One embedded face for everything; "bold" runs reuse it at a larger size.
    let font_bold = font.clone();

    let mut layer = doc.get_page(page1).get_layer(layer1);

    let content_left = PAGE_MARGIN_X;
    let content_right = PAGE_W - PAGE_MARGIN_X;
    let content_width = content_right - content_left;

    let totals = compute_totals(&record.rows);

    let mut y = PAGE_H - PAGE_MARGIN_TOP;

    // A) Seller header: text block left, logo right.
    let decoded_logo = decode_logo_data_url(&settings.logo_data_url);
    let has_logo = decoded_logo.is_some();
    let header_text_right = if has_logo {
        content_right - LOGO_AREA_W - 6.0
    } else {
        content_right
    };
    let header_text_w = header_text_right - content_left;
    let header_top_y = y;

    let company_name = settings.company_name.trim();
    if !company_name.is_empty() {
        push_line(&layer, &font_bold, company_name, 13.0, content_left, y);
        y -= 5.6;
    }
    for value in [
        settings.address_line.trim().to_string(),
        if settings.gstin.trim().is_empty() {
            String::new()
        } else {
            format!("GSTIN: {}", settings.gstin.trim())
        },
        if settings.phone.trim().is_empty() {
            String::new()
        } else {
            format!("Phone: {}", settings.phone.trim())
        },
    ] {
        if value.is_empty() {
            continue;
        }
        for line in wrap_text_by_width_mm(&face, &value, TEXT_SIZE, header_text_w) {
            push_line(&layer, &font, &line, TEXT_SIZE, content_left, y);
            y -= LINE_H;
        }
    }

    if let Some(img) = decoded_logo {
        let px_w = img.width().max(1) as f32;
        let px_h = img.height().max(1) as f32;
        let natural_w_mm = px_w / LOGO_DPI * 25.4;
        let natural_h_mm = px_h / LOGO_DPI * 25.4;

        let scale_w = LOGO_AREA_W / natural_w_mm.max(1.0);
        let scale_h = LOGO_MAX_H / natural_h_mm.max(1.0);
        let scale = scale_w.min(scale_h).min(1.0).max(0.01);

        let scaled_w_mm = natural_w_mm * scale;
        let scaled_h_mm = natural_h_mm * scale;

        // Right-aligned, top edge level with the company name line.
        let logo_x = content_right - scaled_w_mm;
        let logo_bottom_y = header_top_y - scaled_h_mm;

        let image = Image::from_dynamic_image(&img);
        image.add_to_layer(
            layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(logo_x)),
                translate_y: Some(Mm(logo_bottom_y)),
                rotate: None,
                scale_x: Some(scale),
                scale_y: Some(scale),
                dpi: Some(LOGO_DPI),
            },
        );
        y = y.min(header_top_y - scaled_h_mm - 2.0);
    }

    y -= 3.0;

    // B) Document title between two rules.
    draw_rule(&layer, content_left, content_right, y, 0.85);
    y -= 6.4;
    push_line_center(
        &layer,
        &font_bold,
        &face,
        "TAX INVOICE",
        12.0,
        content_left + content_width / 2.0,
        y,
    );
    y -= 3.0;
    draw_rule(&layer, content_left, content_right, y, 0.85);
    y -= 7.0;

    // C) Bill meta: customer block left, bill identifiers right.
    let meta_right_x = content_left + content_width * 0.62;
    let meta_left_w = meta_right_x - content_left - 8.0;
    let mut y_left = y;
    let mut y_right = y;

    let mut left_rows: Vec<(&str, String)> = Vec::new();
    if !record.customer.trim().is_empty() {
        left_rows.push(("Customer", record.customer.trim().to_string()));
    }
    if !record.address.trim().is_empty() {
        left_rows.push(("Address", record.address.trim().to_string()));
    }
    if !record.party_gst.trim().is_empty() {
        left_rows.push(("Party GSTIN", record.party_gst.trim().to_string()));
    }

    for (label, value) in left_rows {
        let prefix = format!("{}: ", label);
        let prefix_w = text_width_mm(&face, &prefix, TEXT_SIZE);
        push_line(&layer, &font_bold, &prefix, TEXT_SIZE, content_left, y_left);
        let value_lines =
            wrap_text_by_width_mm(&face, &value, TEXT_SIZE, (meta_left_w - prefix_w).max(10.0));
        for (idx, line) in value_lines.iter().enumerate() {
            push_line(
                &layer,
                &font,
                line,
                TEXT_SIZE,
                content_left + prefix_w,
                y_left - idx as f32 * LINE_H,
            );
        }
        y_left -= (value_lines.len().max(1) as f32) * LINE_H + 0.8;
    }

    let right_rows: [(&str, &str); 3] = [
        ("Bill No", record.bill_no.trim()),
        ("Date", record.date.trim()),
        ("Challan", record.challan.trim()),
    ];
    for (label, value) in right_rows {
        let prefix = format!("{}: ", label);
        let prefix_w = text_width_mm(&face, &prefix, TEXT_SIZE);
        push_line(&layer, &font_bold, &prefix, TEXT_SIZE, meta_right_x, y_right);
        push_line(
            &layer,
            &font,
            value,
            TEXT_SIZE,
            meta_right_x + prefix_w,
            y_right,
        );
        y_right -= LINE_H + 0.8;
    }

    y = y_left.min(y_right) - 2.4;

    // D) Items table.
    let cols = item_columns();
    y = draw_items_header(&layer, &font_bold, &face, &cols, y);

    for (row, line_totals) in record.rows.iter().zip(totals.per_line.iter()) {
        let desc_lines = wrap_text_by_width_mm(&face, &row.description, TEXT_SIZE, cols.desc_w);
        let line_count = desc_lines.len().max(1);
        let row_h = line_count as f32 * LINE_H + 1.6;

        if y - row_h < PAGE_MARGIN_BOTTOM {
            layer = new_page(&doc);
            y = PAGE_H - PAGE_MARGIN_TOP;
            y = draw_items_header(&layer, &font_bold, &face, &cols, y);
        }

        for (idx, line) in desc_lines.iter().enumerate() {
            push_line(&layer, &font, line, TEXT_SIZE, cols.desc_x, y - idx as f32 * LINE_H);
        }
        push_line_center(&layer, &font, &face, row.hsn.trim(), TEXT_SIZE, cols.hsn_cx, y);
        push_line_center(&layer, &font, &face, &format_qty(row.qty), TEXT_SIZE, cols.qty_cx, y);
        push_line_center(&layer, &font, &face, row.unit.trim(), TEXT_SIZE, cols.unit_cx, y);
        push_line_right(
            &layer,
            &font,
            &face,
            &format_currency(row.rate),
            TEXT_SIZE,
            cols.rate_right,
            y,
        );
        push_line_right(
            &layer,
            &font,
            &face,
            &format_currency(line_totals.amount),
            TEXT_SIZE,
            cols.amount_right,
            y,
        );

        y -= row_h;
    }

    y += 1.6;
    draw_rule(&layer, content_left, content_right, y, 0.6);
    y -= 6.0;

    // E) Totals box (right) + amount in words. Break first if they cannot fit.
    let totals_block_h = 4.0 * 5.4 + 14.0;
    if y - totals_block_h < PAGE_MARGIN_BOTTOM {
        layer = new_page(&doc);
        y = PAGE_H - PAGE_MARGIN_TOP;
    }

    let totals_label_x = content_left + content_width * 0.62;
    let totals_rows: [(&str, f64); 3] = [
        ("Subtotal", totals.subtotal),
        ("SGST", totals.total_sgst),
        ("CGST", totals.total_cgst),
    ];
    for (label, value) in totals_rows {
        push_line(&layer, &font, label, 8.7, totals_label_x, y);
        push_line_right(
            &layer,
            &font,
            &face,
            &format_currency(value),
            8.7,
            content_right,
            y,
        );
        y -= 5.4;
    }
    draw_rule(&layer, totals_label_x, content_right, y + 3.4, 0.6);
    push_line(&layer, &font_bold, "Grand Total", 10.0, totals_label_x, y);
    push_line_right(
        &layer,
        &font_bold,
        &face,
        &format_currency(totals.grand_total),
        10.0,
        content_right,
        y,
    );
    y -= 8.0;

    let words = format!("Amount (in words): {}", number_to_words(totals.grand_total));
    for line in wrap_text_by_width_mm(&face, &words, 9.0, content_width) {
        push_line(&layer, &font, &line, 9.0, content_left, y);
        y -= 4.6;
    }

    let mut writer = std::io::BufWriter::new(Vec::<u8>::new());
    doc.save(&mut writer).map_err(|e| e.to_string())?;
    let bytes = writer.into_inner().map_err(|e| e.to_string())?;
    Ok(bytes)
}

pub fn sanitize_filename(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        let ok = ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' || ch == ' ';
        out.push(if ok { ch } else { '_' });
    }
    let trimmed = out.trim().to_string();
    if trimmed.is_empty() {
        "invoice".to_string()
    } else {
        trimmed
    }
}

/// `Invoice_<billNo>.pdf`, falling back to the current unix-millis timestamp
/// when no bill number was entered.
pub fn invoice_pdf_filename(record: &Invoice) -> String {
    let bill = record.bill_no.trim();
    let stem = if bill.is_empty() {
        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        format!("Invoice_{}", millis)
    } else {
        format!("Invoice_{}", bill)
    };
    sanitize_filename(&format!("{}.pdf", stem))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::model::{materialize_invoice, InvoiceFormState, LineItem};

    fn sample_record(rows: usize) -> Invoice {
        let form = InvoiceFormState {
            bill_no: "SB-101".to_string(),
            date: "2025-04-01".to_string(),
            customer: "Mehta Traders".to_string(),
            address: "14 MG Road, Pune".to_string(),
            party_gst: "27AAACM1234A1Z5".to_string(),
            rows: (0..rows)
                .map(|i| LineItem {
                    description: format!("Item {i} with a reasonably long description"),
                    hsn: "7408".to_string(),
                    unit: "kg".to_string(),
                    qty: 2.0,
                    rate: 100.0,
                    sgst_pct: 9.0,
                    cgst_pct: 9.0,
                })
                .collect(),
            ..Default::default()
        };
        materialize_invoice(&form)
    }

    #[test]
    fn generated_pdf_has_pdf_magic() {
        let Ok(_) = load_font_bytes() else {
            eprintln!("skipping: no DejaVuSans.ttf available on this host");
            return;
        };
        let settings = Settings {
            company_name: "Sakshi Enterprises".to_string(),
            gstin: "27AAACS1234A1Z5".to_string(),
            ..Default::default()
        };
        let bytes = generate_pdf_bytes(&sample_record(3), &settings).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn many_rows_paginate_without_error() {
        let Ok(_) = load_font_bytes() else {
            eprintln!("skipping: no DejaVuSans.ttf available on this host");
            return;
        };
        let bytes = generate_pdf_bytes(&sample_record(120), &Settings::default()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn filename_uses_bill_no_when_present() {
        let record = sample_record(1);
        assert_eq!(invoice_pdf_filename(&record), "Invoice_SB-101.pdf");
    }

    #[test]
    fn filename_sanitizes_unsafe_characters() {
        let mut record = sample_record(1);
        record.bill_no = "SB/2025#04".to_string();
        assert_eq!(invoice_pdf_filename(&record), "Invoice_SB_2025_04.pdf");
    }

    #[test]
    fn filename_falls_back_to_timestamp() {
        let mut record = sample_record(1);
        record.bill_no = "   ".to_string();
        let name = invoice_pdf_filename(&record);
        assert!(name.starts_with("Invoice_"));
        assert!(name.ends_with(".pdf"));
        let stem = &name["Invoice_".len()..name.len() - ".pdf".len()];
        assert!(stem.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn qty_formats_without_forced_decimals() {
        assert_eq!(format_qty(2.0), "2");
        assert_eq!(format_qty(1.5), "1.5");
        assert_eq!(format_qty(0.0), "0");
    }

    #[test]
    fn logo_decode_rejects_non_data_urls() {
        assert!(decode_logo_data_url("").is_none());
        assert!(decode_logo_data_url("https://example.com/logo.png").is_none());
        assert!(decode_logo_data_url("data:image/png,plain").is_none());
        assert!(decode_logo_data_url("data:image/png;base64,!!!").is_none());
    }
}
