//! JSON-file catalog of exam-type configs and approved questions.
//!
//! The file is the local cache written by the out-of-scope content sync job.
//! It is loaded once at startup and held in memory; the engines only ever
//! read from it. Unknown question content tags fail the load, so nothing
//! malformed reaches a running exam.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::domain::{DomainError, ExamTypeConfig, Question};
use crate::ports::{ConfigSource, QuestionPool};

#[derive(Deserialize)]
struct CatalogFile {
    exam_types: Vec<ExamTypeConfig>,
    questions: Vec<Question>,
}

/// In-memory catalog backing both [`QuestionPool`] and [`ConfigSource`].
#[derive(Debug)]
pub struct JsonCatalog {
    configs: HashMap<String, ExamTypeConfig>,
    by_domain: HashMap<String, Vec<Question>>,
    by_id: HashMap<String, Question>,
}

impl JsonCatalog {
    /// Build a catalog directly from parsed parts.
    pub fn from_parts(exam_types: Vec<ExamTypeConfig>, questions: Vec<Question>) -> Self {
        let configs = exam_types.into_iter().map(|c| (c.id.clone(), c)).collect();
        let mut by_domain: HashMap<String, Vec<Question>> = HashMap::new();
        let mut by_id = HashMap::with_capacity(questions.len());
        for question in questions {
            by_domain
                .entry(question.domain.clone())
                .or_default()
                .push(question.clone());
            by_id.insert(question.id.clone(), question);
        }
        Self {
            configs,
            by_domain,
            by_id,
        }
    }

    /// Load the catalog file. Content tags are validated by deserialization;
    /// a file with an unrecognized question type never loads.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DomainError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| DomainError::Storage(format!("read catalog {}: {e}", path.display())))?;
        let file: CatalogFile = serde_json::from_str(&raw)
            .map_err(|e| DomainError::Storage(format!("parse catalog {}: {e}", path.display())))?;
        info!(
            path = %path.display(),
            exam_types = file.exam_types.len(),
            questions = file.questions.len(),
            "catalog loaded"
        );
        Ok(Self::from_parts(file.exam_types, file.questions))
    }

    pub fn exam_types(&self) -> impl Iterator<Item = &ExamTypeConfig> {
        self.configs.values()
    }
}

#[async_trait::async_trait]
impl QuestionPool for JsonCatalog {
    async fn approved_questions_by_domain(
        &self,
        domain: &str,
    ) -> Result<Vec<Question>, DomainError> {
        Ok(self.by_domain.get(domain).cloned().unwrap_or_default())
    }

    async fn approved_count_by_domain(&self) -> Result<HashMap<String, u32>, DomainError> {
        Ok(self
            .by_domain
            .iter()
            .map(|(domain, questions)| (domain.clone(), questions.len() as u32))
            .collect())
    }

    async fn questions_by_ids(&self, ids: &[String]) -> Result<Vec<Question>, DomainError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.by_id.get(id).cloned())
            .collect())
    }
}

#[async_trait::async_trait]
impl ConfigSource for JsonCatalog {
    async fn cached_exam_type_config(
        &self,
        id: &str,
    ) -> Result<Option<ExamTypeConfig>, DomainError> {
        Ok(self.configs.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CATALOG_JSON: &str = r#"{
        "exam_types": [{
            "id": "cert",
            "name": "Cert Practice",
            "domains": [
                {"id": "net", "name": "Networking", "weight": 0.5, "question_count": 2},
                {"id": "sec", "name": "Security", "weight": 0.5, "question_count": 1}
            ],
            "passing_score": 70,
            "time_limit_minutes": 90,
            "question_count": 3
        }],
        "questions": [
            {
                "id": "q1",
                "domain": "net",
                "difficulty": "easy",
                "content": {"type": "text", "body": "What is a subnet?"},
                "options": [{"id": "a", "text": "A"}, {"id": "b", "text": "B"}],
                "correct_answers": ["a"],
                "explanation": null,
                "version": 1
            },
            {
                "id": "q2",
                "domain": "net",
                "difficulty": "medium",
                "content": {"type": "code", "language": "bash", "body": "ip route"},
                "options": [{"id": "a", "text": "A"}, {"id": "b", "text": "B"}],
                "correct_answers": ["b"],
                "explanation": "Shows the routing table.",
                "version": 2
            },
            {
                "id": "q3",
                "domain": "sec",
                "difficulty": "hard",
                "content": {"type": "markdown", "body": "**Pick two.**"},
                "options": [{"id": "a", "text": "A"}, {"id": "b", "text": "B"}, {"id": "c", "text": "C"}],
                "correct_answers": ["a", "c"],
                "explanation": null,
                "version": 1
            }
        ]
    }"#;

    fn write_catalog(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn loads_and_serves_the_catalog_file() {
        let (_dir, path) = write_catalog(CATALOG_JSON);
        let catalog = JsonCatalog::load(&path).unwrap();

        let config = catalog.cached_exam_type_config("cert").await.unwrap().unwrap();
        assert_eq!(config.question_count, 3);
        assert!(catalog.cached_exam_type_config("nope").await.unwrap().is_none());

        let counts = catalog.approved_count_by_domain().await.unwrap();
        assert_eq!(counts["net"], 2);
        assert_eq!(counts["sec"], 1);

        let net = catalog.approved_questions_by_domain("net").await.unwrap();
        assert_eq!(net.len(), 2);
        assert!(catalog
            .approved_questions_by_domain("ghost")
            .await
            .unwrap()
            .is_empty());

        let wanted = ["q3".to_string(), "missing".to_string()];
        let found = catalog.questions_by_ids(&wanted).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "q3");
    }

    #[test]
    fn unknown_content_tag_fails_the_load() {
        let bad = CATALOG_JSON.replace(r#""type": "markdown""#, r#""type": "video""#);
        let (_dir, path) = write_catalog(&bad);
        match JsonCatalog::load(&path).unwrap_err() {
            DomainError::Storage(msg) => assert!(msg.contains("parse catalog")),
            other => panic!("expected Storage, got {other}"),
        }
    }
}
