use super::{colorize_status, json_pretty, open_store, resolve_job_id, EXIT_SUCCESS};
use clap::Subcommand;
use prosetta_store::{JobRecord, JobStatus, JobStore};
use std::path::Path;

#[derive(Debug, Subcommand)]
pub enum JobsAction {
    /// List translation jobs, newest first.
    List {
        /// Only show jobs with this status.
        #[arg(long)]
        status: Option<String>,
        /// Maximum number of jobs to show.
        #[arg(long, default_value_t = 50)]
        limit: usize,
        /// Number of jobs to skip.
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Show the full record for one job.
    Show {
        /// Job ID (full or short prefix).
        job_id: String,
    },
    /// Cancel a pending or processing job.
    Cancel {
        /// Job ID (full or short prefix).
        job_id: String,
    },
    /// Aggregate statistics over all jobs.
    Stats,
}

pub fn run(data_dir: &Path, action: &JobsAction, json: bool) -> Result<u8, String> {
    let layout = open_store(data_dir)?;
    let jobs = JobStore::new(layout);

    match action {
        JobsAction::List {
            status,
            limit,
            offset,
        } => list(&jobs, status.as_deref(), *limit, *offset, json),
        JobsAction::Show { job_id } => show(&jobs, job_id, json),
        JobsAction::Cancel { job_id } => cancel(&jobs, job_id, json),
        JobsAction::Stats => stats(&jobs, json),
    }
}

fn list(
    jobs: &JobStore,
    status: Option<&str>,
    limit: usize,
    offset: usize,
    json: bool,
) -> Result<u8, String> {
    let status = match status {
        Some(s) => Some(JobStatus::parse(s).ok_or_else(|| format!("unknown status '{s}'"))?),
        None => None,
    };
    let records = jobs
        .list(status, limit, offset)
        .map_err(|e| format!("store error: {e}"))?;

    if json {
        println!("{}", json_pretty(&records)?);
    } else if records.is_empty() {
        println!("no jobs found");
    } else {
        println!(
            "{:<14} {:<12} {:>5}  {:<8} FILENAME",
            "SHORT_ID", "STATUS", "PROG", "TARGET"
        );
        for record in &records {
            println!(
                "{:<14} {:<12} {:>4}%  {:<8} {}",
                record.job_id.short(),
                colorize_status(record.status.as_str()),
                record.progress,
                record.target_lang,
                record.filename
            );
        }
    }
    Ok(EXIT_SUCCESS)
}

fn show(jobs: &JobStore, input: &str, json: bool) -> Result<u8, String> {
    let id = resolve_job_id(jobs, input)?;
    let record = jobs.get(&id).map_err(|e| e.to_string())?;

    if json {
        println!("{}", json_pretty(&record)?);
    } else {
        print_record(&record);
    }
    Ok(EXIT_SUCCESS)
}

fn cancel(jobs: &JobStore, input: &str, json: bool) -> Result<u8, String> {
    let id = resolve_job_id(jobs, input)?;
    let record = jobs.mark_cancelled(&id).map_err(|e| e.to_string())?;

    if json {
        println!("{}", json_pretty(&record)?);
    } else {
        println!("cancelled job {}", record.job_id.short());
    }
    Ok(EXIT_SUCCESS)
}

fn stats(jobs: &JobStore, json: bool) -> Result<u8, String> {
    let stats = jobs.stats().map_err(|e| format!("store error: {e}"))?;
    if json {
        println!("{}", json_pretty(&stats)?);
    } else {
        println!("total jobs: {}", stats.total);
        for (status, count) in &stats.by_status {
            println!("  {status}: {count}");
        }
        if let Some(avg) = stats.average_processing_time_secs {
            println!("average processing time: {avg:.1}s");
        }
    }
    Ok(EXIT_SUCCESS)
}

fn print_record(record: &JobRecord) {
    println!("job_id:    {}", record.job_id.as_str());
    println!("filename:  {}", record.filename);
    println!(
        "languages: {} -> {}",
        record.source_lang, record.target_lang
    );
    println!("model:     {}", record.model);
    println!(
        "status:    {} ({}%, {})",
        colorize_status(record.status.as_str()),
        record.progress,
        record.stage
    );
    if let Some(ref err) = record.error_message {
        println!("error:     {err}");
    }
    if let Some(ref name) = record.translated_filename {
        println!("output:    {name}");
    }
    if let Some(chunks) = record.chunk_count {
        println!("chunks:    {chunks}");
    }
    if let Some(secs) = record.processing_time_secs {
        println!("duration:  {secs:.1}s");
    }
    println!("created:   {}", record.created_at);
    if let Some(ref completed) = record.completed_at {
        println!("completed: {completed}");
    }
}
