use chrono::{Duration, NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use dosetrack_core::*;
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "dosetrack")]
#[command(about = "Medication dose-time tracking and supply ledger", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file (default: $XDG_CONFIG_HOME/dosetrack/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Act as if the local time were this moment (YYYY-MM-DDTHH:MM[:SS])
    #[arg(long, global = true, value_parser = parse_moment)]
    at: Option<NaiveDateTime>,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current dose-time and today's doses (default)
    Status,

    /// Add a medication
    Add {
        #[arg(long)]
        name: String,

        /// Doses per dose-time, morning first: "1,1/2,0,1"
        #[arg(long, default_value = "0,0,0,0")]
        dose: SlotDoses,

        /// Units on hand
        #[arg(long, default_value = "0")]
        supply: Fraction,

        /// Units added by one refill
        #[arg(long, default_value_t = 0)]
        refill: u32,

        /// daily, as-needed, every:N, weekdays:mon,wed or cycle (21 on / 7 off)
        #[arg(long, default_value = "daily")]
        rule: String,

        /// First scheduled date for every:N and cycle (default: today)
        #[arg(long)]
        origin: Option<NaiveDate>,

        /// Record doses automatically when their dose-time ends
        #[arg(long)]
        auto: bool,
    },

    /// List medications with supply and run-out estimate
    List,

    /// Add one refill to a medication's supply
    Refill { name: String },

    /// Process the end of a dose-time for every medication
    EndDoseTime {
        #[arg(long)]
        slot: DoseTime,

        /// Attributed date (default: the active date)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Record every missed dose since the last run
    CatchUp,

    /// Delete dose history older than the retention horizon
    Prune {
        /// one_month, two_months, six_months, one_year or unlimited
        #[arg(long)]
        retention: Option<RetentionHorizon>,
    },

    /// Show recorded doses
    History {
        /// First date (default: 30 days ago)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last date (default: today)
        #[arg(long)]
        to: Option<NaiveDate>,
    },
}

fn parse_moment(s: &str) -> std::result::Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
        .map_err(|e| format!("expected YYYY-MM-DDTHH:MM[:SS]: {}", e))
}

type Ledger = DoseLedger<FixedClock, FileStore>;

fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init_with_level(logging::level_for_verbosity(cli.verbose));

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| config.data.data_dir.clone());

    // One invocation acts at a single moment.
    let now = cli.at.unwrap_or_else(|| SystemClock.now());
    tracing::debug!("Running at {} with data dir {:?}", now, data_dir);
    let mut ledger = DoseLedger::new(FixedClock(now), config.resolver()?, FileStore::new(data_dir));

    match cli.command {
        Some(Commands::Status) | None => cmd_status(&ledger),
        Some(Commands::Add {
            name,
            dose,
            supply,
            refill,
            rule,
            origin,
            auto,
        }) => cmd_add(&mut ledger, name, dose, supply, refill, &rule, origin, auto),
        Some(Commands::List) => cmd_list(&ledger, &config),
        Some(Commands::Refill { name }) => cmd_refill(&mut ledger, &name),
        Some(Commands::EndDoseTime { slot, date }) => cmd_end_dose_time(&mut ledger, slot, date),
        Some(Commands::CatchUp) => cmd_catch_up(&mut ledger),
        Some(Commands::Prune { retention }) => {
            cmd_prune(&mut ledger, retention.unwrap_or(config.history.retention))
        }
        Some(Commands::History { from, to }) => cmd_history(&ledger, from, to),
    }
}

fn cmd_status(ledger: &Ledger) -> Result<()> {
    let info = ledger.dose_time_info()?;

    println!("Date: {}", info.active_date);
    match (info.active, info.active_end) {
        (Some(slot), Some(end)) => println!("Now:  {} (until {})", slot, end.format("%H:%M")),
        _ => println!("Now:  between dose times"),
    }
    println!(
        "Next: {} at {}",
        info.next,
        info.next_begin.format("%Y-%m-%d %H:%M")
    );

    let medications = ledger.store().medications()?;
    if medications.is_empty() {
        println!("\nNo medications yet. Add one with `dosetrack add`.");
        return Ok(());
    }

    println!();
    for med in medications.iter().filter(|m| m.active) {
        let doses = med.scheduled_doses(info.active_date)?;
        let today = if doses.is_zero() {
            "nothing today".to_string()
        } else {
            format!("today {}", doses)
        };
        println!("  {:<20} {:<28} supply {}", med.name, today, med.supply);
    }
    Ok(())
}

/// Parse the `--rule` argument.
fn parse_rule(rule: &str, origin: NaiveDate) -> Result<RepeatRule> {
    let (kind, arg) = match rule.split_once(':') {
        Some((kind, arg)) => (kind, Some(arg)),
        None => (rule, None),
    };
    let parsed = match (kind.trim().to_lowercase().as_str(), arg) {
        ("daily", None) => RepeatRule::Daily,
        ("as-needed", None) => RepeatRule::AsNeeded,
        ("every", Some(n)) => RepeatRule::EveryNDays {
            origin,
            n: n.trim().parse().map_err(|_| {
                Error::InvalidRepeatArgument(format!("every:N needs a number, got {:?}", n))
            })?,
        },
        ("weekdays", Some(days)) => RepeatRule::Weekdays { mask: days.parse()? },
        ("cycle", None) => RepeatRule::Cycle21On7Off { origin },
        _ => {
            return Err(Error::InvalidRepeatArgument(format!(
                "unknown rule {:?}",
                rule
            )))
        }
    };
    parsed.validate()?;
    Ok(parsed)
}

#[allow(clippy::too_many_arguments)]
fn cmd_add(
    ledger: &mut Ledger,
    name: String,
    dose: SlotDoses,
    supply: Fraction,
    refill: u32,
    rule: &str,
    origin: Option<NaiveDate>,
    auto: bool,
) -> Result<()> {
    if supply.is_negative() {
        return Err(Error::InvalidFraction(format!("negative supply {}", supply)));
    }
    if ledger.store().medication_by_name(&name)?.is_some() {
        return Err(Error::Other(format!("medication {:?} already exists", name)));
    }

    let info = ledger.dose_time_info()?;
    let repeat = parse_rule(rule, origin.unwrap_or(info.active_date))?;

    let mut med = Medication::new(name, dose, repeat);
    med.supply = supply;
    med.refill_size = refill;
    if auto {
        med.enable_auto_create(info.active_date - Duration::days(1));
    }
    ledger.store_mut().save_medication(&med)?;
    tracing::info!("Added medication {} ({})", med.name, med.id);

    println!("✓ Added {} ({})", med.name, med.repeat);
    println!("  Doses: {}", med.doses);
    println!("  Supply: {}", med.supply);
    if med.auto_create {
        println!("  Automatic recording on");
    }
    Ok(())
}

fn cmd_list(ledger: &Ledger, config: &Config) -> Result<()> {
    let info = ledger.dose_time_info()?;
    let medications = ledger.store().medications()?;
    if medications.is_empty() {
        println!("No medications.");
        return Ok(());
    }

    let horizon = config.history.run_out_horizon_days;
    for med in &medications {
        let run_out = match med.estimated_run_out(info.active_date, horizon)? {
            Some(date) => format!("runs out {}", date),
            None => format!("lasts beyond {} days", horizon),
        };
        let flags = match (med.active, med.auto_create) {
            (false, _) => " [inactive]",
            (true, true) => " [auto]",
            (true, false) => "",
        };
        println!("{}{}", med.name, flags);
        println!("  {} | doses {} | supply {} | {}", med.repeat, med.doses, med.supply, run_out);
    }
    Ok(())
}

fn cmd_refill(ledger: &mut Ledger, name: &str) -> Result<()> {
    let mut med = ledger
        .store()
        .medication_by_name(name)?
        .ok_or_else(|| Error::UnknownMedication(name.to_string()))?;
    if med.refill_size == 0 {
        println!("{} has no refill size set.", med.name);
        return Ok(());
    }

    let supply = med.refill()?;
    ledger.store_mut().save_medication(&med)?;
    tracing::info!("Refilled {} by {}", med.name, med.refill_size);
    println!("✓ Refilled {}: supply now {}", med.name, supply);
    Ok(())
}

fn medication_names(ledger: &Ledger) -> Result<HashMap<Uuid, String>> {
    Ok(ledger
        .store()
        .medications()?
        .into_iter()
        .map(|m| (m.id, m.name))
        .collect())
}

fn cmd_end_dose_time(ledger: &mut Ledger, slot: DoseTime, date: Option<NaiveDate>) -> Result<()> {
    let date = match date {
        Some(date) => date,
        None => ledger.dose_time_info()?.active_date,
    };
    let names = medication_names(ledger)?;

    let outcomes = ledger.process_dose_time_end_all(date, slot)?;
    if outcomes.is_empty() {
        println!("No medications.");
    }
    for (id, outcome) in outcomes {
        let name = names.get(&id).map(String::as_str).unwrap_or("?");
        match outcome {
            ProcessOutcome::Recorded(event) => {
                println!("✓ {}: recorded {} for {} {}", name, event.quantity, date, slot)
            }
            ProcessOutcome::Skipped(reason) => println!("  {}: skipped ({})", name, describe(reason)),
        }
    }
    Ok(())
}

fn describe(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::AutoCreateDisabled => "automatic recording off",
        SkipReason::Inactive => "inactive",
        SkipReason::NothingScheduled => "nothing scheduled",
        SkipReason::InsufficientSupply => "insufficient supply",
        SkipReason::AlreadyRecorded => "already recorded",
    }
}

fn cmd_catch_up(ledger: &mut Ledger) -> Result<()> {
    let names = medication_names(ledger)?;
    let reports = ledger.backfill_all()?;
    tracing::debug!("Catch-up covered {} medications", reports.len());
    if reports.is_empty() {
        println!("No medications with automatic recording.");
        return Ok(());
    }

    for report in reports {
        let name = names
            .get(&report.medication_id)
            .map(String::as_str)
            .unwrap_or("?");
        let through = report
            .last_processed
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "✓ {}: {} doses recorded ({} taken from supply), processed through {}",
            name,
            report.recorded.len(),
            report.consumed,
            through
        );
    }
    Ok(())
}

fn cmd_prune(ledger: &mut Ledger, retention: RetentionHorizon) -> Result<()> {
    let report = ledger.prune_history(retention)?;
    match report.cutoff {
        None => println!("Retention is unlimited - nothing pruned."),
        Some(cutoff) => {
            println!("✓ Pruned {} dose events before {}", report.deleted, cutoff);
            if let (Some(oldest), Some(newest)) = (report.oldest, report.newest) {
                println!("  Removed range: {} to {}", oldest, newest);
            }
        }
    }
    Ok(())
}

fn cmd_history(ledger: &Ledger, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<()> {
    let today = ledger.dose_time_info()?.display_date;
    let to = to.unwrap_or(today);
    let from = from.unwrap_or(to - Duration::days(30));

    let names = medication_names(ledger)?;
    let events = ledger.store().events_between(from, to)?;
    if events.is_empty() {
        println!("No doses recorded between {} and {}.", from, to);
        return Ok(());
    }

    for event in &events {
        let name = names
            .get(&event.medication_id)
            .map(String::as_str)
            .unwrap_or("(removed)");
        let origin = if event.auto_created { "auto" } else { "manual" };
        println!(
            "{} {:<8} {:<20} {:>8}  {}",
            event.date,
            event.dose_time.to_string(),
            name,
            event.quantity.to_string(),
            origin
        );
    }
    println!("Total: {} ({} doses)", DoseEvent::total(&events)?, events.len());
    Ok(())
}
