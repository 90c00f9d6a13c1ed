use once_cell::sync::Lazy;
use regex::Regex;

use super::models::{FitEvaluation, FitLabel};

/// Recognized skills, in scan order. Not user-extensible.
pub const SKILL_VOCABULARY: [&str; 73] = [
    // languages
    "python",
    "java",
    "javascript",
    "c++",
    "c#",
    "ruby",
    "php",
    "go",
    "rust",
    "swift",
    "kotlin",
    "typescript",
    "scala",
    "r programming",
    // web frameworks
    "django",
    "flask",
    "fastapi",
    "react",
    "angular",
    "vue",
    "node.js",
    "express",
    "spring",
    "asp.net",
    "laravel",
    "rails",
    // databases
    "sql",
    "mysql",
    "postgresql",
    "mongodb",
    "oracle",
    "redis",
    "cassandra",
    "dynamodb",
    "elasticsearch",
    // cloud and devops
    "aws",
    "azure",
    "gcp",
    "docker",
    "kubernetes",
    "jenkins",
    "terraform",
    "ansible",
    "ci/cd",
    "devops",
    "linux",
    // data science and ml
    "machine learning",
    "deep learning",
    "data science",
    "nlp",
    "computer vision",
    "tensorflow",
    "pytorch",
    "scikit-learn",
    "pandas",
    "numpy",
    "jupyter",
    // practices
    "api",
    "rest",
    "graphql",
    "microservices",
    "agile",
    "scrum",
    "git",
    "testing",
    "unit testing",
    "integration testing",
    // soft skills
    "communication",
    "leadership",
    "team player",
    "problem solving",
    "analytical",
    "collaboration",
];

pub const STRONG_FIT_THRESHOLD: u8 = 70;
pub const GOOD_FIT_THRESHOLD: u8 = 50;
pub const MODERATE_FIT_THRESHOLD: u8 = 30;

const MAX_LISTED_MATCHES: usize = 5;
const MAX_LISTED_MISSING: usize = 3;

static VOCABULARY_PATTERNS: Lazy<Vec<Keyword>> =
    Lazy::new(|| SKILL_VOCABULARY.iter().map(|term| Keyword::new(term)).collect());

static EXPERIENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+)\+?\s*(?:years?|yrs?)\s+(?:of\s+)?experience").unwrap()
});

#[derive(Debug, Clone)]
struct Keyword {
    term: String,
    pattern: Regex,
}

impl Keyword {
    /// The term must not touch a word character on either side, so `go` never
    /// matches inside `good` and `c++` still matches before a space.
    fn new(term: &str) -> Self {
        let pattern = Regex::new(&format!(r"(?:^|\W){}(?:\W|$)", regex::escape(term)))
            .expect("escaped keyword is a valid pattern");
        Self {
            term: term.to_string(),
            pattern,
        }
    }

    fn occurs_in(&self, lowercase_text: &str) -> bool {
        self.pattern.is_match(lowercase_text)
    }
}

/// Keywords recognized in one job description. Recompute if the JD changes.
#[derive(Debug, Clone)]
pub struct JdKeywordSet {
    keywords: Vec<Keyword>,
}

impl JdKeywordSet {
    pub fn from_jd_text(jd_text: &str) -> Self {
        let jd_lower = jd_text.to_lowercase();

        let mut keywords: Vec<Keyword> = Vec::new();
        for keyword in VOCABULARY_PATTERNS.iter() {
            if keyword.occurs_in(&jd_lower) && !keywords.iter().any(|k| k.term == keyword.term) {
                keywords.push(keyword.clone());
            }
        }

        if let Some(years) = EXPERIENCE_RE
            .captures(&jd_lower)
            .and_then(|captures| captures.get(1))
        {
            keywords.push(Keyword::new(&format!("{}+ years experience", years.as_str())));
        }

        Self { keywords }
    }

    pub fn terms(&self) -> Vec<String> {
        self.keywords.iter().map(|k| k.term.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Pure function of (keyword set, resume text).
    pub fn evaluate(&self, resume_text: &str) -> FitEvaluation {
        if resume_text.trim().is_empty() {
            return FitEvaluation {
                score: 0,
                label: FitLabel::CannotEvaluate,
                comment: "No resume text found".to_string(),
                matched: Vec::new(),
                missing: Vec::new(),
            };
        }

        let resume_lower = resume_text.to_lowercase();
        let (matched, missing): (Vec<&Keyword>, Vec<&Keyword>) = self
            .keywords
            .iter()
            .partition(|keyword| keyword.occurs_in(&resume_lower));
        let matched: Vec<String> = matched.into_iter().map(|k| k.term.clone()).collect();
        let missing: Vec<String> = missing.into_iter().map(|k| k.term.clone()).collect();

        let score = match_score(matched.len(), self.keywords.len());
        FitEvaluation {
            score,
            label: fit_label(score),
            comment: screening_comment(score, &matched, &missing),
            matched,
            missing,
        }
    }
}

/// `round(100 * matched / total)`, 0 for an empty keyword set.
pub fn match_score(matched: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }

    let matched = matched.min(total);
    ((200 * matched + total) / (2 * total)) as u8
}

pub fn fit_label(score: u8) -> FitLabel {
    if score >= STRONG_FIT_THRESHOLD {
        FitLabel::StrongFit
    } else if score >= GOOD_FIT_THRESHOLD {
        FitLabel::GoodFit
    } else if score >= MODERATE_FIT_THRESHOLD {
        FitLabel::ModerateFit
    } else {
        FitLabel::WeakFit
    }
}

pub fn screening_comment(score: u8, matched: &[String], missing: &[String]) -> String {
    let mut parts = vec![format!("Match Score: {score}%.")];

    if !matched.is_empty() {
        let top: Vec<&str> = matched
            .iter()
            .take(MAX_LISTED_MATCHES)
            .map(String::as_str)
            .collect();
        parts.push(format!("Key skills: {}.", top.join(", ")));
    }

    if !missing.is_empty() && score < STRONG_FIT_THRESHOLD {
        let top: Vec<&str> = missing
            .iter()
            .take(MAX_LISTED_MISSING)
            .map(String::as_str)
            .collect();
        parts.push(format!("Missing: {}.", top.join(", ")));
    }

    parts.join(" ")
}

pub fn evaluate(jd_text: &str, resume_text: &str) -> FitEvaluation {
    JdKeywordSet::from_jd_text(jd_text).evaluate(resume_text)
}
