use crate::row::{FieldValue, OutputRow};
use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Workbook};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Union of every row's columns, in first-seen order.
pub fn columns(rows: &[OutputRow]) -> Vec<&'static str> {
    let mut out: Vec<&'static str> = Vec::new();
    for row in rows {
        for (name, _) in row.fields() {
            if !out.contains(&name) {
                out.push(name);
            }
        }
    }
    out
}

fn cell_text(value: Option<&FieldValue>) -> String {
    match value {
        Some(FieldValue::Number(n)) if n.is_finite() => n.to_string(),
        Some(FieldValue::Text(s)) => s.clone(),
        _ => String::new(),
    }
}

fn lookup<'a>(fields: &'a [(&'static str, Option<FieldValue>)], column: &str) -> Option<&'a FieldValue> {
    fields.iter().find(|(name, _)| *name == column).and_then(|(_, v)| v.as_ref())
}

// ── CSV ──

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

fn write_record<W: Write>(mut w: W, cells: &[String]) -> std::io::Result<()> {
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            w.write_all(b",")?;
        }
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            w.write_all(cell.as_bytes())?;
        }
    }
    w.write_all(b"\n")
}

/// Renders rows as CSV text. Missing values are empty cells.
pub fn to_csv(rows: &[OutputRow]) -> String {
    let header = columns(rows);
    let mut buf = Vec::new();
    let head: Vec<String> = header.iter().map(|c| c.to_string()).collect();
    // Writes into a Vec cannot fail.
    let _ = write_record(&mut buf, &head);
    for row in rows {
        let fields = row.fields();
        let cells: Vec<String> = header.iter().map(|c| cell_text(lookup(&fields, c))).collect();
        let _ = write_record(&mut buf, &cells);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Returns false without touching the filesystem when there is nothing to write.
pub fn write_csv(rows: &[OutputRow], path: &Path) -> Result<bool> {
    if rows.is_empty() {
        info!("📭 No rows, skipping CSV export to {}", path.display());
        return Ok(false);
    }
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut out = BufWriter::new(file);
    out.write_all(to_csv(rows).as_bytes())
        .with_context(|| format!("writing {}", path.display()))?;
    out.flush()?;
    info!("💾 Wrote {} rows to {}", rows.len(), path.display());
    Ok(true)
}

// ── XLSX ──

pub fn write_xlsx(rows: &[OutputRow], path: &Path) -> Result<bool> {
    if rows.is_empty() {
        info!("📭 No rows, skipping XLSX export to {}", path.display());
        return Ok(false);
    }
    let header = columns(rows);
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let sheet = workbook.add_worksheet();

    for (col, name) in header.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *name, &bold)?;
    }
    for (i, row) in rows.iter().enumerate() {
        let r = (i + 1) as u32;
        let fields = row.fields();
        for (col, name) in header.iter().enumerate() {
            let c = col as u16;
            match lookup(&fields, name) {
                Some(FieldValue::Number(n)) if n.is_finite() => {
                    sheet.write_number(r, c, *n)?;
                }
                Some(FieldValue::Text(s)) => {
                    sheet.write_string(r, c, s)?;
                }
                _ => {}
            }
        }
    }

    workbook
        .save(path)
        .with_context(|| format!("saving {}", path.display()))?;
    info!("💾 Wrote {} rows to {}", rows.len(), path.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::{BasketballRow, FootballRow};

    fn basketball(game: &str, odd: Option<f64>) -> OutputRow {
        OutputRow::Basketball(BasketballRow {
            date: "2024-03-01".into(),
            time: "20:00".into(),
            league: "USA, NBA".into(),
            game: game.into(),
            home_odd: odd,
            ..BasketballRow::default()
        })
    }

    #[test]
    fn header_is_union_in_first_seen_order() {
        let rows = vec![
            basketball("A - B", Some(1.5)),
            OutputRow::Football(FootballRow::default()),
        ];
        let cols = columns(&rows);
        assert_eq!(&cols[..4], &["date", "time", "league", "game"]);
        assert!(cols.contains(&"homeFullTimeOdd"));
        assert_eq!(cols.iter().filter(|c| **c == "date").count(), 1);
    }

    #[test]
    fn csv_quotes_and_blanks() {
        let csv = to_csv(&[basketball("Lakers, LA - \"Celtics\"", None)]);
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("date,time,league,game,homeOdd"));
        let body = lines.next().unwrap();
        assert!(body.starts_with("2024-03-01,20:00,\"USA, NBA\",\"Lakers, LA - \"\"Celtics\"\"\",,"));
    }

    #[test]
    fn empty_export_writes_nothing() {
        let dir = std::env::temp_dir().join(format!("odds_harvest_export_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let csv = dir.join("empty.csv");
        let xlsx = dir.join("empty.xlsx");
        assert!(!write_csv(&[], &csv).unwrap());
        assert!(!write_xlsx(&[], &xlsx).unwrap());
        assert!(!csv.exists());
        assert!(!xlsx.exists());
    }

    #[test]
    fn writes_both_formats() {
        let dir = std::env::temp_dir().join(format!("odds_harvest_export_w_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let rows = vec![basketball("A - B", Some(1.5))];
        assert!(write_csv(&rows, &dir.join("out.csv")).unwrap());
        assert!(write_xlsx(&rows, &dir.join("out.xlsx")).unwrap());
        let text = std::fs::read_to_string(dir.join("out.csv")).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(std::fs::metadata(dir.join("out.xlsx")).unwrap().len() > 0);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
