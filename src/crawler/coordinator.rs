//! Crawl sequencer - the validate→fetch protocol
//!
//! This module walks the candidate codes of a year in order:
//! - validate the code against the suggestion endpoint
//! - fetch and parse the record when it exists
//! - hand the record to persistence
//! - stop when the termination policy says the year is exhausted
//!
//! It also drives the multi-year crawl, resumption from stored progress and
//! the status monitor that re-fetches stored records.

use crate::config::{Config, CrawlerConfig, PortalConfig};
use crate::crawler::parser::{parse_detail_json, parse_record_xml, parse_validate_response};
use crate::crawler::{
    pause, ConsecutiveMisses, OutboundRequest, RequestExecutor, TerminationPolicy, Transport,
};
use crate::state::{CandidateCode, CrawlOutcome, OutcomeKind, Phase};
use crate::storage::{Persistence, TrademarkRecord};
use crate::{ConfigError, CrawlError, Result};
use std::ops::RangeInclusive;
use tokio_util::sync::CancellationToken;

/// Summary of one crawled year
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct YearReport {
    pub year: i32,
    pub start_sequence: u32,
    /// Candidates validated
    pub checked: u32,
    /// Records fetched and parsed
    pub fetched: u32,
    /// Validated candidates whose fetch failed
    pub skipped: u32,
    /// Validation misses, including the one that ended the year
    pub misses: u32,
    /// Records that could not be written
    pub persistence_failures: u32,
    /// Code that ended the year
    pub terminated_at: Option<String>,
}

/// Summary of one status refresh
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorReport {
    pub checked: u32,
    /// Records whose stored fields changed
    pub updated: u32,
    /// Records whose status changed
    pub status_changed: u32,
    pub failed: u32,
}

/// Drives the crawl protocol over a `RequestExecutor`
pub struct CrawlSequencer<T> {
    executor: RequestExecutor<T>,
    persistence: Box<dyn Persistence>,
    policy: Box<dyn TerminationPolicy>,
    crawler: CrawlerConfig,
    portal: PortalConfig,
    cancel: CancellationToken,
}

impl<T: Transport> CrawlSequencer<T> {
    /// Creates a sequencer using the executor's cancel token
    pub fn new(
        executor: RequestExecutor<T>,
        persistence: Box<dyn Persistence>,
        config: &Config,
    ) -> Self {
        let cancel = executor.cancel_token().clone();
        Self {
            executor,
            persistence,
            policy: Box::new(ConsecutiveMisses::new(config.crawler.max_consecutive_misses)),
            crawler: config.crawler.clone(),
            portal: config.portal.clone(),
            cancel,
        }
    }

    /// Replaces the termination policy
    pub fn with_policy(mut self, policy: Box<dyn TerminationPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn executor(&self) -> &RequestExecutor<T> {
        &self.executor
    }

    pub fn persistence_mut(&mut self) -> &mut dyn Persistence {
        self.persistence.as_mut()
    }

    /// Checks whether the registry knows `code`
    pub async fn validate(&mut self, code: &CandidateCode) -> Result<bool> {
        let request = OutboundRequest::get(&self.portal.validate_url)
            .with_query(&self.portal.validate_param, code.to_string());

        let result = match self.executor.execute(request).await {
            Ok(response) => parse_validate_response(&response.body, code),
            Err(e) => Err(e),
        };

        match &result {
            Ok(true) => self.audit(CrawlOutcome::success(code.to_string(), Phase::Validate)),
            Ok(false) => self.audit(CrawlOutcome::failure(
                code.to_string(),
                Phase::Validate,
                OutcomeKind::NotFound,
                "no exact suggestion",
            )),
            Err(e) => self.audit_error(code, Phase::Validate, e),
        }

        result
    }

    /// Fetches and parses the portal record of `code`
    pub async fn fetch(&mut self, code: &CandidateCode) -> Result<TrademarkRecord> {
        let form = vec![(
            self.portal.fetch_field.clone(),
            self.portal.fetch_filter_for(&code.to_string()),
        )];
        let request = OutboundRequest::post_form(&self.portal.fetch_url, form);

        let result = match self.executor.execute(request).await {
            Ok(response) => parse_record_xml(&response.body, code),
            Err(e) => Err(e),
        };
        self.audit_result(code, Phase::Fetch, &result);
        result
    }

    /// Fetches a record from the JSON detail API
    pub async fn fetch_detail(&mut self, code: &CandidateCode) -> Result<TrademarkRecord> {
        let base = self.portal.detail_url.as_deref().ok_or_else(|| {
            CrawlError::Config(ConfigError::Validation(
                "portal.detail-url is not configured".to_string(),
            ))
        })?;
        let url = format!("{}/{}", base.trim_end_matches('/'), code);

        let result = match self.executor.execute(OutboundRequest::get(url)).await {
            Ok(response) => parse_detail_json(&response.body, code),
            Err(e) => Err(e),
        };
        self.audit_result(code, Phase::Fetch, &result);
        result
    }

    /// Crawls one year from the configured start sequence
    ///
    /// # Returns
    ///
    /// The number of records fetched and parsed
    pub async fn crawl_year(&mut self, year: i32) -> Result<u32> {
        let report = self.crawl_year_from(year, self.crawler.start_sequence).await?;
        Ok(report.fetched)
    }

    /// Crawls one year starting at `start_sequence`
    ///
    /// Candidates are visited strictly in order. A validation miss (not
    /// found, transport failure or an unreadable answer) goes to the
    /// termination policy. A failed fetch skips the candidate. Expired
    /// sessions, an exhausted proxy pool and cancellation abort the crawl.
    pub async fn crawl_year_from(&mut self, year: i32, start_sequence: u32) -> Result<YearReport> {
        let mut report = YearReport {
            year,
            start_sequence,
            ..YearReport::default()
        };
        let mut code = CandidateCode::new(self.crawler.code_prefix.clone(), year, start_sequence);
        self.policy.reset();

        tracing::info!("Crawling year {} starting at {}", year, code);

        loop {
            report.checked += 1;

            let exists = match self.validate(&code).await {
                Ok(exists) => exists,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!("Validation of {} failed: {}", code, e);
                    false
                }
            };

            if exists {
                self.policy.record_hit(&code);
                match self.fetch(&code).await {
                    Ok(record) => {
                        if !self.persist(&record) {
                            report.persistence_failures += 1;
                        }
                        report.fetched += 1;
                        tracing::debug!(
                            "Fetched {} ({})",
                            code,
                            record.mark_name.as_deref().unwrap_or("-")
                        );
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        tracing::warn!("Skipping {}: {}", code, e);
                        report.skipped += 1;
                    }
                }
            } else {
                report.misses += 1;
                if self.policy.record_miss(&code) {
                    report.terminated_at = Some(code.to_string());
                    break;
                }
                tracing::debug!("{} not found, continuing", code);
            }

            if self.crawler.batch_size > 0 && report.checked % self.crawler.batch_size == 0 {
                tracing::info!(
                    "Year {}: {} candidates checked, {} records fetched (at {})",
                    year,
                    report.checked,
                    report.fetched,
                    code
                );
            }

            pause(self.crawler.request_delay(), &self.cancel).await?;
            code = match code.next() {
                Some(next) => next,
                None => {
                    tracing::warn!("Sequence space of year {} exhausted at {}", year, code);
                    report.terminated_at = Some(code.to_string());
                    break;
                }
            };
        }

        tracing::info!(
            "Year {} done: {} records fetched, {} skipped, ended at {}",
            year,
            report.fetched,
            report.skipped,
            code
        );
        Ok(report)
    }

    /// Sequence a resumed crawl of `year` starts at
    ///
    /// One past the highest stored sequence, never below the configured
    /// start sequence.
    pub fn resume_sequence(&self, year: i32) -> Result<u32> {
        let stored = self
            .persistence
            .last_sequence(&self.crawler.code_prefix, year)?;
        Ok(stored
            .map(|last| last.saturating_add(1))
            .unwrap_or(self.crawler.start_sequence)
            .max(self.crawler.start_sequence))
    }

    /// Crawls several years in order
    ///
    /// With `resume`, every year continues after its stored progress.
    pub async fn crawl_years(
        &mut self,
        years: RangeInclusive<i32>,
        resume: bool,
    ) -> Result<Vec<YearReport>> {
        let mut reports = Vec::new();

        for year in years {
            let start = if resume {
                self.resume_sequence(year)?
            } else {
                self.crawler.start_sequence
            };
            reports.push(self.crawl_year_from(year, start).await?);
        }

        let total: u32 = reports.iter().map(|r| r.fetched).sum();
        tracing::info!("Crawled {} year(s), {} records", reports.len(), total);
        Ok(reports)
    }

    /// Re-fetches every stored record with `status` and merges what changed
    ///
    /// The detail API is used when configured, the portal fetch otherwise.
    /// A status change is appended to the record's history.
    pub async fn refresh_status(&mut self, status: &str) -> Result<MonitorReport> {
        let records = self.persistence.records_with_status(status)?;
        let mut report = MonitorReport::default();

        tracing::info!("Refreshing {} record(s) with status {:?}", records.len(), status);

        for stored in records {
            report.checked += 1;

            let Some(code) = CandidateCode::parse(&stored.code) else {
                tracing::warn!("{}", CrawlError::InvalidCode(stored.code.clone()));
                report.failed += 1;
                continue;
            };

            let fresh = if self.portal.detail_url.is_some() {
                self.fetch_detail(&code).await
            } else {
                self.fetch(&code).await
            };

            match fresh {
                Ok(fresh) => {
                    let status_changed = fresh.status.is_some() && fresh.status != stored.status;
                    let mut merged = stored.clone();
                    if merged.merge(fresh) {
                        report.updated += 1;
                        if status_changed {
                            report.status_changed += 1;
                            tracing::info!(
                                "{} changed status {:?} -> {:?}",
                                code,
                                stored.status,
                                merged.status
                            );
                        }
                        self.write_refreshed(&merged, status_changed);
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!("Refresh of {} failed: {}", code, e);
                    report.failed += 1;
                }
            }

            pause(self.crawler.request_delay(), &self.cancel).await?;
        }

        Ok(report)
    }

    /// Stores a fetched record, logging rather than raising failures
    ///
    /// Status history gets a row when the record is new or its status
    /// differs from the stored one.
    fn persist(&mut self, record: &TrademarkRecord) -> bool {
        let previous_status = match self.persistence.get_record(&record.code) {
            Ok(existing) => existing.map(|r| r.status),
            Err(e) => {
                tracing::warn!("Failed to read stored {}: {}", record.code, e);
                None
            }
        };

        let id = match self.persistence.upsert_record(record) {
            Ok(id) => id,
            Err(e) => {
                tracing::error!("Failed to store {}: {}", record.code, e);
                return false;
            }
        };

        if let Some(status) = &record.status {
            if previous_status.as_ref() != Some(&record.status) {
                if let Err(e) = self.persistence.append_status_history(id, status, None) {
                    tracing::error!("Failed to record status of {}: {}", record.code, e);
                    return false;
                }
            }
        }

        true
    }

    fn write_refreshed(&mut self, record: &TrademarkRecord, status_changed: bool) {
        let id = match self.persistence.upsert_record(record) {
            Ok(id) => id,
            Err(e) => {
                tracing::error!("Failed to store refreshed {}: {}", record.code, e);
                return;
            }
        };

        if let (true, Some(status)) = (status_changed, &record.status) {
            if let Err(e) = self
                .persistence
                .append_status_history(id, status, Some("status refresh"))
            {
                tracing::error!("Failed to record status of {}: {}", record.code, e);
            }
        }
    }

    fn audit_result(
        &mut self,
        code: &CandidateCode,
        phase: Phase,
        result: &Result<TrademarkRecord>,
    ) {
        match result {
            Ok(_) => self.audit(CrawlOutcome::success(code.to_string(), phase)),
            Err(e) => self.audit_error(code, phase, e),
        }
    }

    fn audit_error(&mut self, code: &CandidateCode, phase: Phase, error: &CrawlError) {
        if matches!(error, CrawlError::Cancelled) {
            return;
        }
        self.audit(CrawlOutcome::failure(
            code.to_string(),
            phase,
            error.outcome_kind(),
            error.to_string(),
        ));
    }

    fn audit(&mut self, outcome: CrawlOutcome) {
        if !self.crawler.audit_log {
            return;
        }
        let outcome = outcome.with_proxy(self.executor.last_proxy().map(String::from));
        if let Err(e) = self.persistence.append_crawl_log(&outcome) {
            tracing::warn!("Failed to write crawl log for {}: {}", outcome.code, e);
        }
    }
}
