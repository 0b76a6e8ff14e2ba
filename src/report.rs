//! Printable order requisition (PDF).

use std::io::BufWriter;

use printpdf::*;
use thiserror::Error;

use crate::models::{Order, Organization, Patient};

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("PDF font error: {0}")]
    Font(String),

    #[error("PDF save error: {0}")]
    Save(String),
}

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const LEFT: f32 = 20.0;
const INDENT: f32 = 25.0;
const BOTTOM_MARGIN: f32 = 20.0;
const WRAP_CHARS: usize = 90;

/// Cursor over the current page that starts a new page when it runs out
/// of room.
struct Writer<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    y: Mm,
    font: IndirectFontRef,
    bold: IndirectFontRef,
}

impl Writer<'_> {
    fn ensure_room(&mut self, needed: f32) {
        if self.y.0 - needed < BOTTOM_MARGIN {
            let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = Mm(PAGE_HEIGHT - 17.0);
        }
    }

    fn heading(&mut self, text: &str) {
        self.ensure_room(12.0);
        self.y -= Mm(4.0);
        self.layer.use_text(text, 11.0, Mm(LEFT), self.y, &self.bold);
        self.y -= Mm(6.0);
    }

    fn line(&mut self, text: &str) {
        for line in wrap_text(text, WRAP_CHARS) {
            self.ensure_room(4.5);
            self.layer.use_text(&line, 9.0, Mm(INDENT), self.y, &self.font);
            self.y -= Mm(4.5);
        }
    }

    fn field(&mut self, label: &str, value: Option<&str>) {
        self.line(&format!("{label}: {}", value.unwrap_or("-")));
    }
}

/// Render an order as a one-or-more page requisition. Returns PDF bytes.
pub fn render_order_pdf(
    order: &Order,
    patient: &Patient,
    referring_org: &Organization,
) -> Result<Vec<u8>, ReportError> {
    let title = format!("Imaging Order {}", order.order_number);
    let (doc, page1, layer1) = PdfDocument::new(&title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| ReportError::Font(e.to_string()))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| ReportError::Font(e.to_string()))?;

    let mut w = Writer {
        layer: doc.get_page(page1).get_layer(layer1),
        doc: &doc,
        y: Mm(280.0),
        font,
        bold,
    };

    // Header
    w.layer.use_text(&title, 14.0, Mm(LEFT), w.y, &w.bold);
    w.y -= Mm(6.0);
    w.line(&format!(
        "{} | Status: {} | Created: {}",
        referring_org.name,
        order.status,
        order.created_at.format("%Y-%m-%d %H:%M")
    ));
    if let Some(npi) = &referring_org.npi {
        w.line(&format!("Referring NPI: {npi}"));
    }

    w.heading("PATIENT");
    w.line(&patient.full_name());
    let dob = patient.date_of_birth.map(|d| d.format("%Y-%m-%d").to_string());
    w.field("Date of birth", dob.as_deref());
    w.field("MRN", patient.mrn.as_deref());
    w.field("Phone", patient.phone.as_deref());
    w.field("Insurance", patient.insurance_provider.as_deref());
    w.field("Policy", patient.insurance_policy_number.as_deref());

    w.heading("CLINICAL INDICATION");
    w.line(&order.dictation);

    w.heading("EXAM");
    w.field("Modality", order.modality.as_deref());
    w.field("Body part", order.body_part.as_deref());
    w.field("Laterality", order.laterality.as_deref());
    match (&order.cpt_code, &order.cpt_description) {
        (Some(code), Some(desc)) => w.line(&format!("CPT {code}: {desc}")),
        (Some(code), None) => w.line(&format!("CPT {code}")),
        _ => w.line("CPT: -"),
    }

    w.heading("DIAGNOSES (ICD-10)");
    let descriptions = order.icd10_description_list();
    let codes = order.icd10_code_list();
    if codes.is_empty() {
        w.line("-");
    }
    for (i, code) in codes.iter().enumerate() {
        let desc = descriptions.get(i).map(String::as_str).unwrap_or("");
        w.line(&format!("{code}  {desc}"));
    }

    w.heading("APPROPRIATENESS");
    let score = order.compliance_score.map(|s| format!("{s} / 9"));
    w.field("Compliance score", score.as_deref());
    w.field("Validation", order.validation_status.as_deref());
    if let Some(notes) = &order.validation_notes {
        w.line(notes);
    }

    w.heading("SIGNATURE");
    match (&order.signature_name, order.signed_at) {
        (Some(name), Some(at)) => {
            w.line(&format!("Electronically signed by {name}"));
            w.line(&format!("Signed at {} UTC", at.format("%Y-%m-%d %H:%M")));
        }
        _ => w.line("Not signed"),
    }

    drop(w);
    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| ReportError::Save(e.to_string()))?;
    buf.into_inner()
        .map_err(|e| ReportError::Save(e.to_string()))
}

/// Simple word-wrap helper for PDF text rendering.
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.len() + word.len() + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}
