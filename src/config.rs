use crate::db;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

pub const INGEST_SECTION_KEY: &str = "setup.ingest";

/// Uploads above this size are refused before the workbook is opened.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// Sheet and column naming conventions used by the workbook importer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngestConfig {
    pub grades_sheet: String,
    pub name_column: String,
    pub group_column: String,
    pub recommendation_column: String,
    pub iq_column: String,
    pub intelligence_keywords: Vec<String>,
    pub iq_keywords: Vec<String>,
    pub max_file_bytes: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            grades_sheet: "notas".into(),
            name_column: "nom".into(),
            group_column: "grado_seccion".into(),
            recommendation_column: "1_apreciacion_tutor".into(),
            iq_column: "ci".into(),
            intelligence_keywords: [
                "inteligencia",
                "intelligence",
                "intel",
                "multiple",
                "múltiple",
                "brain",
                "cerebro",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            iq_keywords: [
                "ci",
                "iq",
                "coeficiente",
                "coefficient",
                "intelectual",
                "quotient",
                "intelligence-quotient",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

impl IngestConfig {
    pub fn load(conn: &Connection) -> anyhow::Result<Self> {
        match db::settings_get_json(conn, INGEST_SECTION_KEY)? {
            Some(v) => Ok(serde_json::from_value(v)?),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, conn: &Connection) -> anyhow::Result<()> {
        db::settings_set_json(conn, INGEST_SECTION_KEY, &serde_json::to_value(self)?)
    }

    pub fn validate(&self) -> Result<(), String> {
        let columns = [
            ("gradesSheet", &self.grades_sheet),
            ("nameColumn", &self.name_column),
            ("groupColumn", &self.group_column),
            ("recommendationColumn", &self.recommendation_column),
            ("iqColumn", &self.iq_column),
        ];
        for (key, value) in columns {
            if value.trim().is_empty() {
                return Err(format!("{} must not be empty", key));
            }
        }
        if self.intelligence_keywords.iter().all(|k| k.trim().is_empty()) {
            return Err("intelligenceKeywords must contain at least one keyword".into());
        }
        if self.iq_keywords.iter().all(|k| k.trim().is_empty()) {
            return Err("iqKeywords must contain at least one keyword".into());
        }
        if self.max_file_bytes == 0 {
            return Err("maxFileBytes must be positive".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg: IngestConfig =
            serde_json::from_value(serde_json::json!({ "gradesSheet": "grades" })).expect("parse");
        assert_eq!(cfg.grades_sheet, "grades");
        assert_eq!(cfg.name_column, "nom");
        assert_eq!(cfg.max_file_bytes, DEFAULT_MAX_FILE_BYTES);
    }

    #[test]
    fn load_reads_persisted_section() {
        let conn = Connection::open_in_memory().expect("open");
        db::init_schema(&conn).expect("init");
        assert_eq!(IngestConfig::load(&conn).expect("load"), IngestConfig::default());

        let mut cfg = IngestConfig::default();
        cfg.iq_keywords = vec!["quotient".into()];
        cfg.save(&conn).expect("save");
        assert_eq!(IngestConfig::load(&conn).expect("reload").iq_keywords, vec!["quotient"]);
    }

    #[test]
    fn validate_rejects_empty_names() {
        let mut cfg = IngestConfig::default();
        cfg.name_column = "  ".into();
        assert!(cfg.validate().is_err());
        assert!(IngestConfig::default().validate().is_ok());
    }
}
