use std::path::PathBuf;

use chrono::Utc;
use log::{info, warn};

use crate::chain::{ChainElement, ChainError, ChainPolicy, ChainReport, ElementError, ElementState, SubmissionRecord};
use crate::config::ClusterConfig;
use crate::slurm::{JobId, Scheduler};

/// Runs chains against one scheduler with one cluster config
pub struct ChainCoordinator<'a, S: Scheduler> {
    scheduler: &'a S,
    config: &'a ClusterConfig,
    policy: ChainPolicy,
}

impl<'a, S: Scheduler> ChainCoordinator<'a, S> {
    pub fn new(scheduler: &'a S, config: &'a ClusterConfig, policy: ChainPolicy) -> Self {
        ChainCoordinator { scheduler, config, policy }
    }

    /// Render, write and submit every element, each depending on the one before
    pub fn run(&self, elements: &[ChainElement]) -> Result<ChainReport, ChainError> {
        self.run_from(elements, 0, None)
    }

    /// Resume a chain at `start`, optionally after a job that is already queued
    ///
    /// This is how a failed element gets retried: the operator picks the element and the job
    /// it should wait for. Elements before `start` stay PENDING in the report. A `start` past the
    /// last element is an error, since it would submit nothing.
    pub fn run_from(
        &self,
        elements: &[ChainElement],
        start: usize,
        after: Option<JobId>,
    ) -> Result<ChainReport, ChainError> {
        let mut report = ChainReport {
            policy: self.policy,
            records: elements
                .iter()
                .enumerate()
                .map(|(index, element)| SubmissionRecord::pending(index, element.script_path()))
                .collect(),
        };
        if start > 0 && start >= elements.len() {
            let source = ElementError::NoSuchElement { start, len: elements.len() };
            warn!("Nothing to submit: {source}");
            return Err(ChainError { index: start, directory: PathBuf::new(), source, report });
        }
        info!("Running chain of {} jobs from element {} ({} policy)", elements.len(), start, self.policy);

        let mut dependency = after;
        for (index, element) in elements.iter().enumerate().skip(start) {
            let record = &mut report.records[index];
            match self.advance(element, dependency.as_ref(), record) {
                Ok(job_id) => {
                    info!("Element {index} submitted as job {job_id}");
                    dependency = Some(job_id);
                }
                Err(err) => {
                    record.state = ElementState::Failed;
                    record.error = Some(err.to_string());
                    match self.policy {
                        ChainPolicy::FailFast => {
                            warn!("Element {index} failed, stopping chain: {err}");
                            return Err(ChainError {
                                index,
                                directory: element.directory.clone(),
                                source: err,
                                report,
                            });
                        }
                        ChainPolicy::Continue => {
                            warn!("Element {index} failed, next element will be submitted without a dependency: {err}");
                            dependency = None;
                        }
                    }
                }
            }
        }

        Ok(report)
    }

    /// Render and write every element without submitting anything
    pub fn stage(&self, elements: &[ChainElement]) -> Result<Vec<PathBuf>, ChainError> {
        let mut scripts = Vec::new();
        for (index, element) in elements.iter().enumerate() {
            let staged = element
                .render(self.config)
                .map_err(ElementError::from)
                .and_then(|rendered| element.write(&rendered).map_err(ElementError::from));

            if let Err(source) = staged {
                let mut report = ChainReport {
                    policy: self.policy,
                    records: elements
                        .iter()
                        .enumerate()
                        .map(|(i, element)| SubmissionRecord::pending(i, element.script_path()))
                        .collect(),
                };
                for record in report.records.iter_mut().take(index) {
                    record.state = ElementState::Written;
                }
                report.records[index].state = ElementState::Failed;
                report.records[index].error = Some(source.to_string());
                return Err(ChainError { index, directory: element.directory.clone(), source, report });
            }
            info!("Staged {}", element.script_path().display());
            scripts.push(element.script_path());
        }
        Ok(scripts)
    }

    fn advance(
        &self,
        element: &ChainElement,
        dependency: Option<&JobId>,
        record: &mut SubmissionRecord,
    ) -> Result<JobId, ElementError> {
        let rendered = element.render(self.config)?;
        record.state = ElementState::Rendered;

        let outcomes = element.write(&rendered)?;
        record.warnings = outcomes.into_iter().filter_map(|outcome| outcome.permission_warning).collect();
        record.state = ElementState::Written;

        record.dependency = dependency.cloned();
        record.state = ElementState::Submitted;
        let job_id = self.scheduler.submit(&record.script_path, dependency)?;

        record.job_id = Some(job_id.clone());
        record.submitted_at = Some(Utc::now());
        record.state = ElementState::Chained;
        Ok(job_id)
    }
}
