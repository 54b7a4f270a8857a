#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_profilerd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn profilerd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_default()
}

pub fn error_code(resp: &serde_json::Value) -> Option<&str> {
    resp.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

pub fn select_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &Path,
) {
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
}

/// A worksheet cell in a fixture workbook.
#[derive(Debug, Clone)]
pub enum Fx {
    Text(String),
    Num(f64),
    Empty,
}

pub fn t(s: &str) -> Fx {
    Fx::Text(s.to_string())
}

pub fn n(v: f64) -> Fx {
    Fx::Num(v)
}

pub struct FixtureSheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Fx>>,
}

pub fn sheet(name: &str, headers: &[&str], rows: Vec<Vec<Fx>>) -> FixtureSheet {
    FixtureSheet {
        name: name.to_string(),
        headers: headers.iter().map(|h| h.to_string()).collect(),
        rows,
    }
}

fn column_letters(mut idx: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push(b'A' + (idx % 26) as u8);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    out.reverse();
    String::from_utf8(out).expect("ascii")
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn cell_xml(col: usize, row: usize, cell: &Fx) -> String {
    let r = format!("{}{}", column_letters(col), row);
    match cell {
        Fx::Text(s) => format!(
            "<c r=\"{}\" t=\"inlineStr\"><is><t xml:space=\"preserve\">{}</t></is></c>",
            r,
            xml_escape(s)
        ),
        Fx::Num(v) => format!("<c r=\"{}\"><v>{}</v></c>", r, v),
        Fx::Empty => String::new(),
    }
}

fn sheet_xml(sheet: &FixtureSheet) -> String {
    let mut rows = String::new();
    let header: Vec<Fx> = sheet.headers.iter().map(|h| t(h)).collect();
    for (i, row) in std::iter::once(&header).chain(sheet.rows.iter()).enumerate() {
        let cells: String = row
            .iter()
            .enumerate()
            .map(|(c, cell)| cell_xml(c, i + 1, cell))
            .collect();
        rows.push_str(&format!("<row r=\"{}\">{}</row>", i + 1, cells));
    }
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\">\
         <sheetData>{}</sheetData></worksheet>",
        rows
    )
}

/// Writes a minimal `.xlsx` with inline-string cells.
pub fn write_xlsx(path: &Path, sheets: &[FixtureSheet]) {
    let file = std::fs::File::create(path).expect("create xlsx");
    let mut zip = ZipWriter::new(file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let sheet_overrides: String = (1..=sheets.len())
        .map(|i| {
            format!(
                "<Override PartName=\"/xl/worksheets/sheet{}.xml\" \
                 ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>",
                i
            )
        })
        .collect();
    let content_types = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
         <Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
         <Default Extension=\"xml\" ContentType=\"application/xml\"/>\
         <Override PartName=\"/xl/workbook.xml\" \
         ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>\
         {}</Types>",
        sheet_overrides
    );
    let root_rels = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
         <Relationship Id=\"rId1\" \
         Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" \
         Target=\"xl/workbook.xml\"/></Relationships>";
    let sheet_entries: String = sheets
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "<sheet name=\"{}\" sheetId=\"{}\" r:id=\"rId{}\"/>",
                xml_escape(&s.name),
                i + 1,
                i + 1
            )
        })
        .collect();
    let workbook = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <workbook xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" \
         xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\">\
         <sheets>{}</sheets></workbook>",
        sheet_entries
    );
    let sheet_rels: String = (1..=sheets.len())
        .map(|i| {
            format!(
                "<Relationship Id=\"rId{}\" \
                 Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet\" \
                 Target=\"worksheets/sheet{}.xml\"/>",
                i, i
            )
        })
        .collect();
    let workbook_rels = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">{}</Relationships>",
        sheet_rels
    );

    let mut entries = vec![
        ("[Content_Types].xml".to_string(), content_types),
        ("_rels/.rels".to_string(), root_rels.to_string()),
        ("xl/workbook.xml".to_string(), workbook),
        ("xl/_rels/workbook.xml.rels".to_string(), workbook_rels),
    ];
    for (i, s) in sheets.iter().enumerate() {
        entries.push((format!("xl/worksheets/sheet{}.xml", i + 1), sheet_xml(s)));
    }
    for (name, body) in entries {
        zip.start_file(name, opts).expect("start zip entry");
        zip.write_all(body.as_bytes()).expect("write zip entry");
    }
    zip.finish().expect("finish xlsx");
}

/// Grades, intelligence and IQ sheets for two students.
pub fn classroom_workbook() -> Vec<FixtureSheet> {
    vec![
        sheet(
            "notas",
            &[
                "nom",
                "grado_seccion",
                "1_matematicas_c1",
                "1_matematicas_c2",
                "1_arte_c1",
                "1_matematicas_conclusion",
                "1_apreciacion_tutor",
            ],
            vec![
                vec![
                    t("Ana García"),
                    t("1A"),
                    t("A"),
                    n(3.0),
                    t("c"),
                    t("B"),
                    t("Muy participativa"),
                ],
                vec![
                    t("Luis Pérez"),
                    t("1A"),
                    t("B"),
                    Fx::Empty,
                    t("D"),
                    t("C"),
                    Fx::Empty,
                ],
            ],
        ),
        sheet(
            "inteligencias",
            &["grado_seccion", "nom", "Logica", "Musical"],
            vec![
                vec![t("1A"), t("Ana García"), n(85.0), t("NaN")],
                vec![t("1A"), t("Luis Pérez"), n(60.0), n(72.5)],
            ],
        ),
        sheet(
            "CI",
            &["nom", "ci"],
            vec![
                vec![t("Ana García"), n(112.0)],
                vec![t("Luis Pérez"), n(98.0)],
            ],
        ),
    ]
}
