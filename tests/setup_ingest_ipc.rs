mod test_support;

use serde_json::json;
use test_support::{
    error_code, request, request_ok, select_workspace, sheet, spawn_sidecar, t, temp_dir, write_xlsx,
};

#[test]
fn ingest_section_defaults_then_persists_patch() {
    let workspace = temp_dir("profilerd-setup-ingest");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let got = request_ok(&mut stdin, &mut reader, "1", "setup.get", json!({ "section": "ingest" }));
    assert_eq!(got["ingest"]["gradesSheet"], json!("notas"));
    assert_eq!(got["ingest"]["nameColumn"], json!("nom"));
    assert_eq!(got["ingest"]["maxFileBytes"], json!(10 * 1024 * 1024));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "setup.update",
        json!({ "section": "ingest", "patch": { "gradesSheet": "calificaciones", "maxFileBytes": 4096 } }),
    );
    let got = request_ok(&mut stdin, &mut reader, "3", "setup.get", json!({}));
    assert_eq!(got["ingest"]["gradesSheet"], json!("calificaciones"));
    assert_eq!(got["ingest"]["maxFileBytes"], json!(4096));
    assert_eq!(got["ingest"]["iqColumn"], json!("ci"));

    for (i, bad) in [
        json!({ "section": "ingest", "patch": { "nameColumn": "" } }),
        json!({ "section": "ingest", "patch": { "unknownField": true } }),
        json!({ "section": "ingest", "patch": { "maxFileBytes": -5 } }),
        json!({ "section": "printer", "patch": {} }),
        json!({ "section": "ingest" }),
    ]
    .into_iter()
    .enumerate()
    {
        let resp = request(&mut stdin, &mut reader, &format!("bad-{i}"), "setup.update", bad);
        assert_eq!(error_code(&resp), Some("bad_params"), "{resp}");
    }
    let got = request_ok(&mut stdin, &mut reader, "4", "setup.get", json!({}));
    assert_eq!(got["ingest"]["nameColumn"], json!("nom"));
}

#[test]
fn ingest_honours_configured_sheet_name_and_size_limit() {
    let workspace = temp_dir("profilerd-setup-applied");
    let xlsx = workspace.join("renamed.xlsx");
    write_xlsx(
        &xlsx,
        &[sheet(
            "Calificaciones",
            &["nom", "1_matematicas_c1"],
            vec![vec![t("Ana"), t("A")]],
        )],
    );

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);
    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "ingest.workbook",
        json!({ "path": xlsx.to_string_lossy() }),
    );
    assert_eq!(error_code(&resp), Some("no_grades_sheet"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "setup.update",
        json!({ "section": "ingest", "patch": { "gradesSheet": "calificaciones" } }),
    );
    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "ingest.workbook",
        json!({ "path": xlsx.to_string_lossy() }),
    );
    assert_eq!(summary["gradesSheet"], json!("Calificaciones"));
    assert_eq!(summary["studentsCreated"], json!(1));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "setup.update",
        json!({ "section": "ingest", "patch": { "maxFileBytes": 16 } }),
    );
    let resp = request(
        &mut stdin,
        &mut reader,
        "5",
        "ingest.workbook",
        json!({ "path": xlsx.to_string_lossy() }),
    );
    assert_eq!(error_code(&resp), Some("file_too_large"));
    assert_eq!(resp["error"]["details"]["max"], json!(16));
}
