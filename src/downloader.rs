use crate::visitor::VisitorRecord;
use chrono::FixedOffset;
#[cfg(feature = "web")]
use std::error::Error;

/// Column headers shared by every export format.
pub const EXPORT_HEADERS: [&str; 14] = [
    "Nome",
    "Telefone",
    "Gênero",
    "Faixa etária",
    "Bairro",
    "Cidade",
    "CEP",
    "Status",
    "Visitas",
    "Data de cadastro",
    "Como conheceu",
    "Quem convidou",
    "Consolidador",
    "Observações",
];

/// Registration date as `dd/mm/yyyy` on the local calendar, or empty.
pub fn registration_date(record: &VisitorRecord, local: FixedOffset) -> String {
    record
        .created_at_in(local)
        .map(|ts| ts.with_timezone(&local).format("%d/%m/%Y").to_string())
        .unwrap_or_default()
}

fn export_row(record: &VisitorRecord, local: FixedOffset) -> [String; 14] {
    let opt = |value: Option<&str>| value.unwrap_or("").to_string();
    let meta = &record.metadata;
    [
        record.name.clone(),
        opt(record.phone()),
        opt(record.gender()),
        opt(record.age_bracket_label()),
        opt(record.neighborhood()),
        opt(record.city()),
        opt(meta.cep.as_deref()),
        record.status.label().to_string(),
        record.visit_count.to_string(),
        registration_date(record, local),
        opt(meta.como_conheceu.as_deref()),
        opt(meta.nome_pessoa_convidou.as_deref()),
        opt(meta.nome_consolidador.as_deref()),
        opt(meta.observacoes.as_deref()),
    ]
}

fn push_csv_field(out: &mut String, value: &str) {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        out.push('"');
        out.push_str(&value.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(value);
    }
}

/// Convert visitors to CSV format
///
/// One header row followed by one line per visitor, in the order given.
/// Fields containing commas, quotes or line breaks are quoted, with inner
/// quotes doubled. Missing values are left empty.
///
/// # Arguments
/// * `records` - Visitors to export
/// * `local` - Offset of the local calendar used for the registration date
pub fn to_csv(records: &[VisitorRecord], local: FixedOffset) -> String {
    let mut csv_content = String::new();

    for (i, header) in EXPORT_HEADERS.iter().enumerate() {
        if i > 0 {
            csv_content.push(',');
        }
        push_csv_field(&mut csv_content, header);
    }
    csv_content.push('\n');

    for record in records {
        for (i, value) in export_row(record, local).iter().enumerate() {
            if i > 0 {
                csv_content.push(',');
            }
            push_csv_field(&mut csv_content, value);
        }
        csv_content.push('\n');
    }

    csv_content
}

/// Convert visitors to XLSX format
///
/// Same columns as [`to_csv`], with a bold header row and the visit count
/// written as a number.
///
/// # Returns
/// * `Result<Vec<u8>, Box<dyn Error>>` - XLSX file content as bytes or an error
#[cfg(feature = "web")]
pub fn to_xlsx(records: &[VisitorRecord], local: FixedOffset) -> Result<Vec<u8>, Box<dyn Error>> {
    use rust_xlsxwriter::{Format, Workbook, Worksheet};

    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    worksheet.set_name("Visitantes")?;

    let bold = Format::new().set_bold();
    for (col, header) in EXPORT_HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *header, &bold)?;
    }

    for (i, record) in records.iter().enumerate() {
        let row = (i + 1) as u32;
        for (col, value) in export_row(record, local).iter().enumerate() {
            if col == 8 {
                worksheet.write_number(row, col as u16, f64::from(record.visit_count))?;
            } else if !value.is_empty() {
                worksheet.write_string(row, col as u16, value)?;
            }
        }
    }

    workbook.push_worksheet(worksheet);
    let buffer = workbook.save_to_buffer()?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::record;

    fn brasilia() -> FixedOffset {
        FixedOffset::west_opt(3 * 3600).unwrap()
    }

    #[test]
    fn csv_has_header_and_escapes_fields() {
        let mut r = record("a", "2024-03-01T02:00:00Z", 2);
        r.name = "Silva, João".into();
        r.metadata.observacoes = Some("Disse \"voltarei\"\nem breve".into());
        r.metadata.telefone = Some("(11) 90000-0000".into());

        let csv = to_csv(&[r], brasilia());
        let header = csv.lines().next().unwrap();
        assert!(header.starts_with("Nome,Telefone,Gênero"));
        assert!(csv.contains("\"Silva, João\",(11) 90000-0000,"));
        assert!(csv.contains("\"Disse \"\"voltarei\"\"\nem breve\""));
        // 02:00 UTC is still February 29th in Brasília.
        assert!(csv.contains(",Novo,2,29/02/2024,"));
    }

    #[test]
    fn missing_values_render_empty() {
        let csv = to_csv(&[record("a", "bad", 1)], brasilia());
        let line = csv.lines().nth(1).unwrap();
        assert_eq!(line, "Visitante a,,,,,,,Novo,1,,,,,");
    }

    #[cfg(feature = "web")]
    #[test]
    fn xlsx_is_a_zip_container() {
        let bytes = to_xlsx(&[record("a", "2024-03-01T10:00:00Z", 1)], brasilia()).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }
}
