use clap::Parser;

/// Citation graph harvester - crawls a citation index, builds out the
/// citation graph for a seeded set of papers, and durably tracks harvest
/// progress across editions, languages, and author partitions.
///
/// Running with no flags starts every managed service (job engine workers,
/// the zombie/auto-resume scheduler, and the page buffer drain loop).
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Log formatter to use
    #[arg(long, value_enum, default_value_t = default_tracing_format())]
    pub tracing: TracingFormat,

    /// Run a single job of the given kind against the configured database
    /// and exit, instead of starting the long-running services. Intended
    /// for operational one-offs (e.g. forcing a retry sweep).
    #[arg(long)]
    pub run_job: Option<String>,
}

#[derive(clap::ValueEnum, Clone, Debug)]
pub enum TracingFormat {
    /// Use pretty formatter (default in debug mode)
    Pretty,
    /// Use JSON formatter (default in release mode)
    Json,
}

#[derive(clap::ValueEnum, Clone, Debug, PartialEq)]
pub enum ServiceName {
    /// Polls the job queue and executes locked jobs
    JobWorkers,
    /// Zombie recovery, auto-resume scanning, job-rate monitoring
    JobScheduler,
    /// Background drain of the durable on-disk page buffer
    BufferDrain,
}

impl ServiceName {
    /// Get all available services
    pub fn all() -> Vec<ServiceName> {
        vec![
            ServiceName::JobWorkers,
            ServiceName::JobScheduler,
            ServiceName::BufferDrain,
        ]
    }

    /// Convert to string for service registration
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceName::JobWorkers => "job_workers",
            ServiceName::JobScheduler => "job_scheduler",
            ServiceName::BufferDrain => "buffer_drain",
        }
    }
}

#[cfg(debug_assertions)]
const DEFAULT_TRACING_FORMAT: TracingFormat = TracingFormat::Pretty;
#[cfg(not(debug_assertions))]
const DEFAULT_TRACING_FORMAT: TracingFormat = TracingFormat::Json;

fn default_tracing_format() -> TracingFormat {
    DEFAULT_TRACING_FORMAT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_name_as_str() {
        assert_eq!(ServiceName::JobWorkers.as_str(), "job_workers");
        assert_eq!(ServiceName::JobScheduler.as_str(), "job_scheduler");
        assert_eq!(ServiceName::BufferDrain.as_str(), "buffer_drain");
    }

    #[test]
    fn test_service_name_all() {
        let all = ServiceName::all();
        assert_eq!(all.len(), 3);
    }
}
