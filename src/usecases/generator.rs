//! Exam assembly: weighted quota apportionment -> uniform per-domain draw ->
//! final shuffle.
//!
//! - Quotas use largest-remainder apportionment so they sum exactly to the
//!   requested total
//! - Counts are pre-checked in one batched read to fail fast with an
//!   aggregate shortfall before drawing anything
//! - The concatenated paper is shuffled so user-visible order does not reveal
//!   domain grouping

use std::cmp::Ordering;
use std::sync::Arc;

use rand::seq::SliceRandom;
use tracing::info;

use crate::domain::validation::validate_exam_type_config;
use crate::domain::{DomainError, DomainShortfall, ExamDomain, ExamTypeConfig, Question};
use crate::ports::QuestionPool;

/// Realized number of questions drawn from one domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainQuota {
    pub domain_id: String,
    pub quota: u32,
}

/// One generated paper: shuffled questions, the realized per-domain
/// distribution and the config it was built from.
#[derive(Debug, Clone)]
pub struct GeneratedExam {
    pub questions: Vec<Question>,
    pub distribution: Vec<DomainQuota>,
    pub config: ExamTypeConfig,
}

/// Result of the cheap pre-check used for UI gating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationCheck {
    pub can_generate: bool,
    pub total_available: u32,
    pub total_required: u32,
    pub shortfall: u32,
}

/// Builds one exam's question set honoring per-domain weighted quotas.
pub struct ExamGenerator {
    pool: Arc<dyn QuestionPool>,
}

impl ExamGenerator {
    pub fn new(pool: Arc<dyn QuestionPool>) -> Self {
        Self { pool }
    }

    /// Largest-remainder apportionment: floor of `weight x total` per domain,
    /// then the remainder goes one unit at a time to the domains with the
    /// largest fractional part, ties broken by declaration order. The result
    /// always sums exactly to `total`.
    pub fn calculate_domain_quota_distribution(
        domains: &[ExamDomain],
        total: u32,
    ) -> Vec<DomainQuota> {
        // No domains means no quotas; the remainder loop below needs at least
        // one fraction to cycle over.
        if domains.is_empty() {
            return Vec::new();
        }

        let mut quotas: Vec<u32> = Vec::with_capacity(domains.len());
        let mut fractions: Vec<(usize, f64)> = Vec::with_capacity(domains.len());

        for (idx, domain) in domains.iter().enumerate() {
            let ideal = domain.weight * f64::from(total);
            let floor = ideal.floor();
            quotas.push(floor as u32);
            fractions.push((idx, ideal - floor));
        }

        fractions.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        let assigned: u32 = quotas.iter().sum();
        let mut remainder = total.saturating_sub(assigned);
        let mut cursor = fractions.iter().cycle();
        while remainder > 0 {
            if let Some((idx, _)) = cursor.next() {
                quotas[*idx] += 1;
                remainder -= 1;
            }
        }

        domains
            .iter()
            .zip(quotas)
            .map(|(domain, quota)| DomainQuota {
                domain_id: domain.id.clone(),
                quota,
            })
            .collect()
    }

    /// Draws `quota` distinct questions uniformly at random from the approved
    /// pool for `domain`.
    pub async fn select_questions_for_domain(
        &self,
        domain: &str,
        quota: u32,
    ) -> Result<Vec<Question>, DomainError> {
        let mut candidates = self.pool.approved_questions_by_domain(domain).await?;
        if (candidates.len() as u32) < quota {
            return Err(DomainError::InsufficientQuestions(vec![DomainShortfall {
                domain: domain.to_string(),
                required: quota,
                available: candidates.len() as u32,
            }]));
        }
        candidates.shuffle(&mut rand::thread_rng());
        candidates.truncate(quota as usize);
        Ok(candidates)
    }

    /// Generates one paper for `config`. Fails fast with the aggregate
    /// shortfall before drawing anything.
    pub async fn generate_exam(
        &self,
        config: &ExamTypeConfig,
    ) -> Result<GeneratedExam, DomainError> {
        let field_errors = validate_exam_type_config(config);
        if !field_errors.is_empty() {
            return Err(DomainError::Validation(field_errors));
        }

        let distribution =
            Self::calculate_domain_quota_distribution(&config.domains, config.question_count);

        let counts = self.pool.approved_count_by_domain().await?;
        let shortfalls: Vec<DomainShortfall> = distribution
            .iter()
            .filter_map(|q| {
                let available = counts.get(&q.domain_id).copied().unwrap_or(0);
                (available < q.quota).then(|| DomainShortfall {
                    domain: q.domain_id.clone(),
                    required: q.quota,
                    available,
                })
            })
            .collect();
        if !shortfalls.is_empty() {
            return Err(DomainError::InsufficientQuestions(shortfalls));
        }

        let mut questions: Vec<Question> = Vec::with_capacity(config.question_count as usize);
        for quota in &distribution {
            let drawn = self
                .select_questions_for_domain(&quota.domain_id, quota.quota)
                .await?;
            questions.extend(drawn);
        }

        // Fisher-Yates over the concatenated paper.
        questions.shuffle(&mut rand::thread_rng());

        info!(
            exam_type = %config.id,
            total = questions.len(),
            domains = distribution.len(),
            "exam generated"
        );

        Ok(GeneratedExam {
            questions,
            distribution,
            config: config.clone(),
        })
    }

    /// Availability pre-check without drawing. Rejects malformed configs the
    /// same way [`generate_exam`](Self::generate_exam) does.
    pub async fn can_generate_exam(
        &self,
        config: &ExamTypeConfig,
    ) -> Result<GenerationCheck, DomainError> {
        let field_errors = validate_exam_type_config(config);
        if !field_errors.is_empty() {
            return Err(DomainError::Validation(field_errors));
        }

        let distribution =
            Self::calculate_domain_quota_distribution(&config.domains, config.question_count);
        let counts = self.pool.approved_count_by_domain().await?;

        let total_available: u32 = config
            .domains
            .iter()
            .map(|d| counts.get(&d.id).copied().unwrap_or(0))
            .sum();
        let shortfall: u32 = distribution
            .iter()
            .map(|q| {
                q.quota
                    .saturating_sub(counts.get(&q.domain_id).copied().unwrap_or(0))
            })
            .sum();

        Ok(GenerationCheck {
            can_generate: shortfall == 0,
            total_available,
            total_required: config.question_count,
            shortfall,
        })
    }
}
