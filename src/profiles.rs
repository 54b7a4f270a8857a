//! Read access to reconciled students, plus the two write paths owned by downstream
//! collaborators: aggregate refresh and cluster label write-back.

use crate::grades::Grade;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeEntry {
    pub code: String,
    pub course: String,
    pub description: String,
    pub grade: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntelligenceEntry {
    pub intelligence_type: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    pub id: String,
    pub name: String,
    pub iq: Option<i64>,
    pub basic_recommendation: Option<String>,
    pub average_grade: Option<f64>,
    pub competency_count: Option<i64>,
    pub cluster_kmeans: Option<i64>,
    pub cluster_dbscan: Option<i64>,
    pub grades: Vec<GradeEntry>,
    pub intelligences: Vec<IntelligenceEntry>,
}

const STUDENT_COLUMNS: &str = "id, name, iq, basic_recommendation, average_grade, competency_count, cluster_kmeans, cluster_dbscan";

fn student_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<StudentProfile> {
    Ok(StudentProfile {
        id: r.get(0)?,
        name: r.get(1)?,
        iq: r.get(2)?,
        basic_recommendation: r.get(3)?,
        average_grade: r.get(4)?,
        competency_count: r.get(5)?,
        cluster_kmeans: r.get(6)?,
        cluster_dbscan: r.get(7)?,
        grades: Vec::new(),
        intelligences: Vec::new(),
    })
}

fn load_grades(conn: &Connection) -> rusqlite::Result<HashMap<String, Vec<GradeEntry>>> {
    let mut stmt = conn.prepare(
        "SELECT g.student_id, ct.code, c.name, ct.description, g.grade
         FROM student_competency_grades g
         JOIN competency_templates ct ON ct.id = g.competency_id
         JOIN courses c ON c.id = ct.course_id
         ORDER BY c.name, ct.code",
    )?;
    let mut out: HashMap<String, Vec<GradeEntry>> = HashMap::new();
    let rows = stmt.query_map([], |r| {
        Ok((
            r.get::<_, String>(0)?,
            GradeEntry {
                code: r.get(1)?,
                course: r.get(2)?,
                description: r.get(3)?,
                grade: r.get(4)?,
            },
        ))
    })?;
    for row in rows {
        let (student_id, entry) = row?;
        out.entry(student_id).or_default().push(entry);
    }
    Ok(out)
}

fn load_intelligences(conn: &Connection) -> rusqlite::Result<HashMap<String, Vec<IntelligenceEntry>>> {
    let mut stmt = conn.prepare(
        "SELECT student_id, intelligence_type, score
         FROM intelligence_scores
         ORDER BY intelligence_type",
    )?;
    let mut out: HashMap<String, Vec<IntelligenceEntry>> = HashMap::new();
    let rows = stmt.query_map([], |r| {
        Ok((
            r.get::<_, String>(0)?,
            IntelligenceEntry {
                intelligence_type: r.get(1)?,
                score: r.get(2)?,
            },
        ))
    })?;
    for row in rows {
        let (student_id, entry) = row?;
        out.entry(student_id).or_default().push(entry);
    }
    Ok(out)
}

pub fn list_students(conn: &Connection) -> rusqlite::Result<Vec<StudentProfile>> {
    let sql = format!("SELECT {} FROM students ORDER BY name", STUDENT_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let mut students = stmt
        .query_map([], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    let mut grades = load_grades(conn)?;
    let mut intelligences = load_intelligences(conn)?;
    for s in &mut students {
        s.grades = grades.remove(&s.id).unwrap_or_default();
        s.intelligences = intelligences.remove(&s.id).unwrap_or_default();
    }
    Ok(students)
}

pub fn get_student(conn: &Connection, student_id: &str) -> rusqlite::Result<Option<StudentProfile>> {
    let sql = format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS);
    let Some(mut student) = conn
        .query_row(&sql, [student_id], student_from_row)
        .optional()?
    else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT ct.code, c.name, ct.description, g.grade
         FROM student_competency_grades g
         JOIN competency_templates ct ON ct.id = g.competency_id
         JOIN courses c ON c.id = ct.course_id
         WHERE g.student_id = ?
         ORDER BY c.name, ct.code",
    )?;
    student.grades = stmt
        .query_map([student_id], |r| {
            Ok(GradeEntry {
                code: r.get(0)?,
                course: r.get(1)?,
                description: r.get(2)?,
                grade: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT intelligence_type, score FROM intelligence_scores
         WHERE student_id = ?
         ORDER BY intelligence_type",
    )?;
    student.intelligences = stmt
        .query_map([student_id], |r| {
            Ok(IntelligenceEntry {
                intelligence_type: r.get(0)?,
                score: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(student))
}

/// Recomputes average grade (A=4 .. D=1) and competency count for every student.
/// Students without grades get 0 and 0. Returns the number of students touched.
pub fn refresh_aggregates(conn: &Connection) -> rusqlite::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut totals: HashMap<String, (f64, i64)> = HashMap::new();
    {
        let mut stmt = tx.prepare("SELECT student_id, grade FROM student_competency_grades")?;
        let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?;
        for row in rows {
            let (student_id, letter) = row?;
            let Some(grade) = Grade::parse_letter(&letter) else {
                continue;
            };
            let e = totals.entry(student_id).or_insert((0.0, 0));
            e.0 += grade.points();
            e.1 += 1;
        }
    }

    let ids = {
        let mut stmt = tx.prepare("SELECT id FROM students")?;
        let ids = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids
    };
    for id in &ids {
        let (sum, n) = totals.get(id).copied().unwrap_or((0.0, 0));
        let avg = if n > 0 { sum / n as f64 } else { 0.0 };
        tx.execute(
            "UPDATE students SET average_grade = ?, competency_count = ? WHERE id = ?",
            (avg, n, id),
        )?;
    }
    tx.commit()?;
    Ok(ids.len())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAssignment {
    pub student_id: String,
    pub kmeans: Option<i64>,
    pub dbscan: Option<i64>,
}

/// Writes cluster labels in one transaction. An unknown student id aborts the whole batch and
/// is returned as `Ok(Err(id))`.
pub fn assign_clusters(
    conn: &Connection,
    assignments: &[ClusterAssignment],
) -> rusqlite::Result<Result<usize, String>> {
    let tx = conn.unchecked_transaction()?;
    for a in assignments {
        let changed = tx.execute(
            "UPDATE students SET cluster_kmeans = ?, cluster_dbscan = ? WHERE id = ?",
            (a.kmeans, a.dbscan, &a.student_id),
        )?;
        if changed == 0 {
            let _ = tx.rollback();
            return Ok(Err(a.student_id.clone()));
        }
    }
    tx.commit()?;
    Ok(Ok(assignments.len()))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRow {
    pub id: String,
    pub name: String,
    pub competency_count: i64,
}

pub fn list_courses(conn: &Connection) -> rusqlite::Result<Vec<CourseRow>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.name, COUNT(ct.id)
         FROM courses c
         LEFT JOIN competency_templates ct ON ct.course_id = c.id
         GROUP BY c.id, c.name
         ORDER BY c.name",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(CourseRow {
                id: r.get(0)?,
                name: r.get(1)?,
                competency_count: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetencyRow {
    pub id: String,
    pub course_id: String,
    pub code: String,
    pub description: String,
}

pub fn list_competencies(
    conn: &Connection,
    course_id: Option<&str>,
) -> rusqlite::Result<Vec<CompetencyRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, course_id, code, description
         FROM competency_templates
         WHERE (?1 IS NULL OR course_id = ?1)
         ORDER BY code",
    )?;
    let rows = stmt
        .query_map([course_id], |r| {
            Ok(CompetencyRow {
                id: r.get(0)?,
                course_id: r.get(1)?,
                code: r.get(2)?,
                description: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
