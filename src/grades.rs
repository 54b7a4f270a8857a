use crate::workbook::Cell;

/// Four-level ordinal scale every grade encoding is reduced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grade {
    A,
    B,
    C,
    D,
}

impl Grade {
    pub fn as_str(self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
        }
    }

    pub fn parse_letter(s: &str) -> Option<Self> {
        match s {
            "A" => Some(Grade::A),
            "B" => Some(Grade::B),
            "C" => Some(Grade::C),
            "D" => Some(Grade::D),
            _ => None,
        }
    }

    /// 1..=4 level used for averages: A=4, B=3, C=2, D=1.
    pub fn points(self) -> f64 {
        match self {
            Grade::A => 4.0,
            Grade::B => 3.0,
            Grade::C => 2.0,
            Grade::D => 1.0,
        }
    }

    fn from_level(level: &str) -> Option<Self> {
        match level {
            "1" => Some(Grade::D),
            "2" => Some(Grade::C),
            "3" => Some(Grade::B),
            "4" => Some(Grade::A),
            _ => None,
        }
    }
}

/// Outcome of normalizing one grade cell. `Rejected` is the silent-skip policy: the cell
/// produces no grade record and the run continues.
#[derive(Debug, Clone, PartialEq)]
pub enum GradeCell {
    Grade(Grade),
    Blank,
    Rejected(String),
}

pub fn normalize_grade(cell: &Cell) -> GradeCell {
    let Some(text) = cell.as_text() else {
        return GradeCell::Blank;
    };
    let upper = text.trim().to_uppercase();
    if let Some(g) = Grade::parse_letter(&upper) {
        return GradeCell::Grade(g);
    }
    let level = upper.strip_suffix(".0").unwrap_or(&upper);
    match Grade::from_level(level) {
        Some(g) => GradeCell::Grade(g),
        None => GradeCell::Rejected(text),
    }
}
