use crate::config::IngestConfig;
use rusqlite::Connection;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

/// Description stored for competency codes missing from the table below.
pub const UNKNOWN_COMPETENCY_DESCRIPTION: &str = "";

const COMPETENCY_DESCRIPTIONS: &[(&str, &str)] = &[
    ("1_matematicas_c1", "Resuelve problemas de cantidad"),
    ("1_matematicas_c2", "Resuelve problemas de regularidad, equivalencia y cambio"),
    ("1_matematicas_c3", "Resuelve problemas de forma, movimiento y localización"),
    ("1_matematicas_c4", "Resuelve problemas de gestión de datos e incertidumbre"),
    ("1_comunicacion_c1", "Se comunica oralmente en su lengua materna"),
    ("1_comunicacion_c2", "Lee diversos tipos de textos escritos en lengua materna"),
    ("1_comunicacion_c3", "Escribe diversos tipos de textos en lengua materna"),
    ("1_ingles_c1", "Se comunica oralmente en inglés como lengua extranjera"),
    ("1_ingles_c2", "Lee diversos tipos de textos escritos en inglés como lengua extranjera"),
    ("1_ingles_c3", "Escribe diversos tipos de textos en inglés como lengua extranjera"),
    ("1_arte_c1", "Aprecia de manera crítica manifestaciones artísticas"),
    ("1_arte_c2", "Crea proyectos desde los lenguajes artísticos"),
    ("1_sociales_c1", "Construye interpretaciones históricas"),
    ("1_sociales_c2", "Gestiona responsablemente el espacio y el ambiente"),
    ("1_sociales_c3", "Gestiona responsablemente los recursos económicos"),
    ("1_desarrollo_c1", "Construye su identidad"),
    ("1_desarrollo_c2", "Convive y participa democráticamente en la búsqueda del bien común"),
    ("1_Desarrollo personal, ciudadanía y cívica _c1", "Construye su identidad"),
    (
        "1_Desarrollo personal, ciudadanía y cívica _c2",
        "Convive y participa democráticamente en la búsqueda del bien común",
    ),
    ("1_ef_c1", "Se desenvuelve de manera autónoma a través de su motricidad"),
    ("1_ef_c2", "Asume una vida saludable"),
    ("1_ef_c3", "Interactúa a través de sus habilidades sociomotrices"),
    (
        "1_religion_c1",
        "Construye su identidad como persona humana, amada por Dios, digna, libre y trascendente",
    ),
    ("1_religion_c2", "Asume la experiencia del encuentro personal y comunitario con Dios"),
    ("1_ciencia_c1", "Indaga mediante métodos científicos para construir conocimientos"),
    ("1_ciencia_c2", "Explica el mundo físico basándose en conocimientos científicos"),
    ("1_ciencia_c3", "Diseña y construye soluciones tecnológicas para resolver problemas"),
    ("1_Ciencia y tecnología_c1", "Competencia c1 de Ciencia Y Tecnología"),
    ("1_Ciencia y tecnología_c2", "Competencia c2 de Ciencia Y Tecnología"),
    ("1_Ciencia y tecnología_c3", "Competencia c3 de Ciencia Y Tecnología"),
    ("1_trabajo_c1", "Gestiona proyectos de emprendimiento económico o social"),
    ("1_quechua_c1", "Se comunica oralmente en quechua como segunda lengua"),
    ("1_quechua_c2", "Lee diversos tipos de textos escritos en quechua como segunda lengua"),
    ("1_quechua_c3", "Escribe diversos tipos de textos en quechua como segunda lengua"),
    ("1_tj", "Competencia de trabajo y juventud"),
    ("1_tj_c1", "Competencia de trabajo y juventud"),
    ("1_tj_c2", "Competencia de trabajo y juventud"),
];

pub fn describe_competency(code: &str) -> &'static str {
    COMPETENCY_DESCRIPTIONS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, d)| *d)
        .unwrap_or(UNKNOWN_COMPETENCY_DESCRIPTION)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompetencyColumn {
    pub code: String,
    pub course: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnKind {
    Competency(CompetencyColumn),
    Ignored,
}

/// Decides from its header alone whether a grades-sheet column carries competency grades.
/// Layout is `<level>_<course>_<index>`; anything with fewer than two `_` segments is ignored.
pub fn classify_column(header: &str, cfg: &IngestConfig) -> ColumnKind {
    let code = header.trim();
    if code.is_empty()
        || code.starts_with("Unnamed")
        || code.contains("_conclusion")
        || code == cfg.name_column
        || code == cfg.group_column
        || code == cfg.recommendation_column
    {
        return ColumnKind::Ignored;
    }
    let parts: Vec<&str> = code.split('_').collect();
    if parts.len() < 2 || parts[1].trim().is_empty() {
        return ColumnKind::Ignored;
    }
    ColumnKind::Competency(CompetencyColumn {
        code: code.to_string(),
        course: parts[1].to_string(),
    })
}

/// Course and competency ids known to one ingestion run. Seeded from the store, then grown as
/// columns are provisioned so each distinct column is created at most once.
#[derive(Debug, Default)]
pub struct ProvisioningContext {
    courses: HashMap<String, String>,
    competencies: HashMap<String, String>,
    pub courses_created: usize,
    pub competencies_created: usize,
}

impl ProvisioningContext {
    pub fn seed(conn: &Connection) -> rusqlite::Result<Self> {
        let mut stmt = conn.prepare("SELECT name, id FROM courses")?;
        let courses = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
            .collect::<Result<HashMap<_, _>, _>>()?;
        let mut stmt = conn.prepare("SELECT code, id FROM competency_templates")?;
        let competencies = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(Self {
            courses,
            competencies,
            courses_created: 0,
            competencies_created: 0,
        })
    }

    /// Returns the competency template id for `col`, creating the course and template first
    /// when they are not known yet.
    pub fn ensure(&mut self, conn: &Connection, col: &CompetencyColumn) -> rusqlite::Result<String> {
        if let Some(id) = self.competencies.get(&col.code) {
            return Ok(id.clone());
        }

        let course_id = match self.courses.get(&col.course) {
            Some(id) => id.clone(),
            None => {
                let id = Uuid::new_v4().to_string();
                conn.execute(
                    "INSERT INTO courses(id, name) VALUES(?, ?)",
                    (&id, &col.course),
                )?;
                info!(course = %col.course, "course created");
                self.courses.insert(col.course.clone(), id.clone());
                self.courses_created += 1;
                id
            }
        };

        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO competency_templates(id, course_id, code, description) VALUES(?, ?, ?, ?)",
            (&id, &course_id, &col.code, describe_competency(&col.code)),
        )?;
        info!(code = %col.code, "competency template created");
        self.competencies.insert(col.code.clone(), id.clone());
        self.competencies_created += 1;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn competency(code: &str, course: &str) -> ColumnKind {
        ColumnKind::Competency(CompetencyColumn {
            code: code.into(),
            course: course.into(),
        })
    }

    #[test]
    fn classify_competency_columns() {
        let cfg = IngestConfig::default();
        assert_eq!(
            classify_column("1_matematicas_c1", &cfg),
            competency("1_matematicas_c1", "matematicas")
        );
        assert_eq!(classify_column(" 1_tj ", &cfg), competency("1_tj", "tj"));
        assert_eq!(
            classify_column("1_Ciencia y tecnología_c2", &cfg),
            competency("1_Ciencia y tecnología_c2", "Ciencia y tecnología")
        );
    }

    #[test]
    fn classify_ignores_reserved_and_malformed_columns() {
        let cfg = IngestConfig::default();
        for h in [
            "nom",
            "grado_seccion",
            "1_apreciacion_tutor",
            "1_matematicas_conclusion",
            "Unnamed: 7",
            "",
            "observaciones",
            "1_",
        ] {
            assert_eq!(classify_column(h, &cfg), ColumnKind::Ignored, "header {h:?}");
        }
    }

    #[test]
    fn description_falls_back_to_empty() {
        assert_eq!(describe_competency("1_matematicas_c1"), "Resuelve problemas de cantidad");
        assert_eq!(describe_competency("9_astronomia_c1"), UNKNOWN_COMPETENCY_DESCRIPTION);
    }

    #[test]
    fn ensure_creates_each_course_and_code_once() {
        let conn = Connection::open_in_memory().expect("open");
        db::init_schema(&conn).expect("init");
        let mut ctx = ProvisioningContext::seed(&conn).expect("seed");
        let c1 = CompetencyColumn {
            code: "1_matematicas_c1".into(),
            course: "matematicas".into(),
        };
        let c2 = CompetencyColumn {
            code: "1_matematicas_c2".into(),
            course: "matematicas".into(),
        };
        let a = ctx.ensure(&conn, &c1).expect("c1");
        let b = ctx.ensure(&conn, &c1).expect("c1 again");
        ctx.ensure(&conn, &c2).expect("c2");
        assert_eq!(a, b);
        assert_eq!(ctx.courses_created, 1);
        assert_eq!(ctx.competencies_created, 2);

        let mut reseeded = ProvisioningContext::seed(&conn).expect("reseed");
        assert_eq!(reseeded.ensure(&conn, &c1).expect("known"), a);
        assert_eq!(reseeded.courses_created, 0);
        assert_eq!(reseeded.competencies_created, 0);

        let courses: i64 = conn
            .query_row("SELECT COUNT(*) FROM courses", [], |r| r.get(0))
            .expect("count");
        assert_eq!(courses, 1);
        let desc: String = conn
            .query_row(
                "SELECT description FROM competency_templates WHERE code = '1_matematicas_c1'",
                [],
                |r| r.get(0),
            )
            .expect("desc");
        assert_eq!(desc, "Resuelve problemas de cantidad");
    }
}
