use crate::config::IngestConfig;
use crate::error::{IngestError, IngestResult};

/// Which sheets of a workbook feed which part of the import.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetLayout {
    pub grades: String,
    pub intelligence: Option<String>,
    pub iq: Option<String>,
}

pub fn locate_sheets(names: &[String], cfg: &IngestConfig) -> IngestResult<SheetLayout> {
    let grades = find_grades_sheet(names, &cfg.grades_sheet)
        .ok_or_else(|| IngestError::NoGradesSheet {
            expected: cfg.grades_sheet.clone(),
            available: names.to_vec(),
        })?
        .to_string();

    // IQ keywords are the more specific set, so IQ claims its sheet first.
    let iq = find_by_keywords(names, &cfg.iq_keywords, &[grades.as_str()]);
    let mut claimed = vec![grades.as_str()];
    if let Some(s) = iq.as_deref() {
        claimed.push(s);
    }
    let intelligence = find_by_keywords(names, &cfg.intelligence_keywords, &claimed);

    Ok(SheetLayout {
        grades,
        intelligence,
        iq,
    })
}

fn find_grades_sheet<'a>(names: &'a [String], expected: &str) -> Option<&'a str> {
    if let Some(exact) = names.iter().find(|n| n.as_str() == expected) {
        return Some(exact);
    }
    let want = expected.trim().to_lowercase();
    names
        .iter()
        .find(|n| n.trim().to_lowercase() == want)
        .map(|s| s.as_str())
}

fn find_by_keywords(names: &[String], keywords: &[String], claimed: &[&str]) -> Option<String> {
    names
        .iter()
        .filter(|n| !claimed.contains(&n.as_str()))
        .find(|n| keywords.iter().any(|k| keyword_matches(n, k)))
        .cloned()
}

/// Case-insensitive match. Keywords of two characters or fewer must equal a whole word of the
/// sheet name; `ci` would otherwise hit every `...ciencia`/`...cias` sheet.
pub fn keyword_matches(sheet_name: &str, keyword: &str) -> bool {
    let keyword = keyword.trim().to_lowercase();
    if keyword.is_empty() {
        return false;
    }
    let name = sheet_name.to_lowercase();
    if keyword.chars().count() <= 2 {
        name.split(|c: char| !c.is_alphanumeric())
            .any(|word| word == keyword)
    } else {
        name.contains(&keyword)
    }
}
