//! Admin tabs and the tables each one reads.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tab {
    Classes,
    Teachers,
    Students,
    Courses,
    Payments,
    Quizzes,
}

impl Tab {
    pub fn title(&self) -> &'static str {
        match self {
            Tab::Classes => "Classes",
            Tab::Teachers => "Teachers",
            Tab::Students => "Students",
            Tab::Courses => "Courses",
            Tab::Payments => "Payments",
            Tab::Quizzes => "Quizzes",
        }
    }

    /// Tables read when the tab is opened.
    pub fn collections(&self) -> &'static [&'static str] {
        match self {
            Tab::Classes => &["classes", "courses", "grades", "teachers", "class_users"],
            Tab::Teachers => &["teachers", "users"],
            Tab::Students => &["students", "users", "grades"],
            Tab::Courses => &["courses", "grades"],
            Tab::Payments => &["payments", "users"],
            Tab::Quizzes => &["quizzes", "courses"],
        }
    }

    pub fn all() -> &'static [Tab] {
        &[
            Tab::Classes,
            Tab::Teachers,
            Tab::Students,
            Tab::Courses,
            Tab::Payments,
            Tab::Quizzes,
        ]
    }

    pub fn index(&self) -> usize {
        Self::all().iter().position(|t| t == self).unwrap_or(0)
    }

    pub fn from_index(index: usize) -> Option<Tab> {
        Self::all().get(index).copied()
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

impl FromStr for Tab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|tab| tab.title().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown tab '{}'", s))
    }
}
