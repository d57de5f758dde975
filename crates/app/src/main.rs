use std::fmt;
use std::io::Write as _;

use chrono::{DateTime, Duration, Utc};
use exam_core::model::{AssessmentConfig, AssessmentKind, Difficulty, ResultError, TestResult};
use exam_core::session::SessionStatus;
use services::{AppServices, Clock, SessionError, SubmitOutcome};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "exam=info,services=info";
const MAX_SEED_COUNT: usize = 1000;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidNumber { flag: &'static str, raw: String },
    InvalidKind { raw: String },
    InvalidDifficulty { raw: String },
    MissingKind,
    ConfirmationRequired,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidKind { raw } => write!(f, "unknown assessment kind: {raw}"),
            ArgsError::InvalidDifficulty { raw } => write!(f, "unknown difficulty: {raw}"),
            ArgsError::MissingKind => write!(f, "take requires an assessment kind"),
            ArgsError::ConfirmationRequired => {
                write!(f, "clear-history deletes every result; pass --yes to confirm")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_number<T: std::str::FromStr>(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<T, ArgsError> {
    let raw = require_value(args, flag)?;
    raw.parse().map_err(|_| ArgsError::InvalidNumber { flag, raw })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  exam status        [--db <sqlite_url>]");
    eprintln!("  exam stats         [--db <sqlite_url>]");
    eprintln!("  exam take <kind>   [--db <sqlite_url>] --topic <name>... [--questions <n>]");
    eprintln!("                     [--difficulty <easy|medium|hard>]");
    eprintln!("  exam seed          [--db <sqlite_url>] [--count <n>]");
    eprintln!("  exam clear-history [--db <sqlite_url>] --yes");
    eprintln!();
    eprintln!("Kinds: daily-quiz, mock-test, custom-test, iq-test, gk-quiz");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:exam.sqlite3");
    eprintln!("  --count 6");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_DB_URL, EXAM_AI_API_KEY, EXAM_AI_BASE_URL, EXAM_AI_MODEL, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Status,
    Stats,
    Take,
    Seed,
    ClearHistory,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "status" => Some(Self::Status),
            "stats" => Some(Self::Stats),
            "take" => Some(Self::Take),
            "seed" => Some(Self::Seed),
            "clear-history" => Some(Self::ClearHistory),
            _ => None,
        }
    }
}

struct Args {
    db_url: String,
    kind: Option<AssessmentKind>,
    topics: Vec<String>,
    num_questions: Option<u32>,
    difficulty: Option<Difficulty>,
    count: usize,
    confirmed: bool,
}

impl Args {
    fn parse(cmd: Command, args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            db_url: normalize_sqlite_url(
                std::env::var("EXAM_DB_URL").unwrap_or_else(|_| services::DEFAULT_DB_URL.into()),
            ),
            kind: None,
            topics: Vec::new(),
            num_questions: None,
            difficulty: None,
            count: 6,
            confirmed: false,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = normalize_sqlite_url(value);
                }
                "--topic" if cmd == Command::Take => {
                    parsed.topics.push(require_value(args, "--topic")?);
                }
                "--questions" if cmd == Command::Take => {
                    parsed.num_questions = Some(parse_number(args, "--questions")?);
                }
                "--difficulty" if cmd == Command::Take => {
                    let raw = require_value(args, "--difficulty")?;
                    let difficulty = raw
                        .parse()
                        .map_err(|_| ArgsError::InvalidDifficulty { raw })?;
                    parsed.difficulty = Some(difficulty);
                }
                "--count" if cmd == Command::Seed => {
                    let count: usize = parse_number(args, "--count")?;
                    if count > MAX_SEED_COUNT {
                        return Err(ArgsError::InvalidNumber {
                            flag: "--count",
                            raw: count.to_string(),
                        });
                    }
                    parsed.count = count;
                }
                "--yes" if cmd == Command::ClearHistory => parsed.confirmed = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                raw if cmd == Command::Take && parsed.kind.is_none() && !raw.starts_with('-') => {
                    let kind = raw.parse().map_err(|_| ArgsError::InvalidKind {
                        raw: raw.to_string(),
                    })?;
                    parsed.kind = Some(kind);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        match cmd {
            Command::Take if parsed.kind.is_none() => Err(ArgsError::MissingKind),
            Command::ClearHistory if !parsed.confirmed => Err(ArgsError::ConfirmationRequired),
            _ => Ok(parsed),
        }
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_dir(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    if let Some(parent) = std::path::Path::new(path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);

    let cmd = match argv.next() {
        None => {
            print_usage();
            return Ok(());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let parsed = Args::parse(cmd, &mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    tracing::debug!(command = ?cmd, db_url = %parsed.db_url, "running command");

    // Storage setup stays in the binary glue so core/services stay pure.
    prepare_sqlite_dir(&parsed.db_url)?;
    let services = AppServices::new_sqlite(&parsed.db_url, Clock::system()).await?;

    match cmd {
        Command::Status => print_status(&services).await,
        Command::Stats => {
            print_stats(&services).await;
            Ok(())
        }
        Command::Take => {
            let kind = parsed.kind.ok_or(ArgsError::MissingKind)?;
            let mut config = AssessmentConfig::preset(kind);
            if let Some(n) = parsed.num_questions {
                config = config.with_num_questions(n)?;
            }
            if parsed.difficulty.is_some() {
                config = config.with_difficulty(parsed.difficulty);
            }
            take(&services, config, parsed.topics).await
        }
        Command::Seed => {
            let samples = sample_results(services.clock().now(), parsed.count)?;
            let history = services.history();
            for result in &samples {
                history.append(result).await?;
            }
            println!("seeded {} results into {}", samples.len(), parsed.db_url);
            Ok(())
        }
        Command::ClearHistory => {
            services.history().clear().await?;
            println!("history cleared");
            Ok(())
        }
    }
}

async fn print_status(services: &AppServices) -> Result<(), Box<dyn std::error::Error>> {
    let now = services.clock().now();
    let status = services.daily_gate().status_at(now).await;
    match (status.available, status.next_available_at) {
        (true, _) => println!("daily quiz: available now"),
        (false, Some(at)) => println!(
            "daily quiz: available at {} (in {})",
            at.format("%Y-%m-%d %H:%M UTC"),
            format_wait(at - now)
        ),
        (false, None) => println!("daily quiz: unavailable"),
    }

    let total = services.history().try_all().await?.len();
    println!("results recorded: {total}");
    Ok(())
}

fn format_wait(wait: Duration) -> String {
    let minutes = wait.num_minutes().max(0);
    format!("{}h {:02}m", minutes / 60, minutes % 60)
}

async fn print_stats(services: &AppServices) {
    let snapshot = services.analytics().snapshot().await;

    println!("total results: {}", snapshot.stats.total);
    for kind in AssessmentKind::ALL {
        println!("  {:<12} {}", kind.as_str(), snapshot.stats.count(kind));
    }

    if snapshot.stats.total == 0 {
        return;
    }

    println!("recent scores:");
    for point in &snapshot.recent {
        println!("  {:<8} {:>5.1}%", point.label(), point.percentage);
    }

    println!("topic performance:");
    for topic in &snapshot.topics {
        println!("  {:<24} {:>3}%", topic.short_label(), topic.percentage);
    }

    println!("monthly average:");
    for month in &snapshot.monthly {
        println!("  {} {:>3}%", month.label(), month.average);
    }
}

async fn take(
    services: &AppServices,
    config: AssessmentConfig,
    topics: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let kind = config.kind();
    let controller = services.controller_with(config);
    let state = controller.start(topics).await?;
    println!(
        "{kind}: {} questions, negative marking {:.2}",
        state.questions().len(),
        state.config().negative_marking()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    for (index, question) in state.questions().iter().enumerate() {
        if controller.status() != SessionStatus::Active {
            println!("time is up");
            break;
        }
        let progress = controller.progress();
        if let Some(countdown) = progress.countdown() {
            let marker = if progress.is_low_time() { " !" } else { "" };
            println!("[{countdown}{marker}] {}/{} answered", progress.answered, progress.total);
        }
        println!("{}. {}", index + 1, question.text());
        for (i, option) in question.options().iter().enumerate() {
            println!("   {}) {option}", option_letter(i));
        }
        print!("answer (a-d, blank to skip): ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let choice = line.trim().to_ascii_lowercase();
        if choice.is_empty() {
            continue;
        }
        let Some(option) = option_index(&choice).and_then(|i| question.options().get(i)) else {
            println!("skipped: {choice} is not one of the choices");
            continue;
        };
        match controller.select_answer(index, option) {
            Ok(()) => {}
            Err(SessionError::NotActive) => {
                println!("time is up");
                break;
            }
            Err(err) => return Err(err.into()),
        }
    }

    if controller.progress().is_complete() {
        println!("all questions answered");
    }
    let outcome = controller.submit().await?;
    print_outcome(&outcome);
    Ok(())
}

fn option_letter(index: usize) -> char {
    char::from(b'a' + u8::try_from(index).unwrap_or(0))
}

fn option_index(choice: &str) -> Option<usize> {
    match choice {
        "a" => Some(0),
        "b" => Some(1),
        "c" => Some(2),
        "d" => Some(3),
        _ => None,
    }
}

fn print_outcome(outcome: &SubmitOutcome) {
    let summary = &outcome.summary;
    println!(
        "score {:.2} / {} ({:.1}%)",
        summary.clamped_score,
        summary.total,
        summary.percentage()
    );
    println!(
        "correct {}, incorrect {}, unattempted {}",
        summary.correct, summary.incorrect, summary.unattempted
    );
    if outcome.result.is_none() {
        println!("result could not be recorded");
    }
}

const SAMPLE_TOPICS: [&str; 4] = [
    "Constitution of Nepal",
    "General Science and Technology",
    "Current Affairs",
    "Logical Reasoning",
];

fn sample_results(now: DateTime<Utc>, count: usize) -> Result<Vec<TestResult>, ResultError> {
    (0..count)
        .map(|i| {
            let kind = AssessmentKind::ALL[i % AssessmentKind::ALL.len()];
            let total = AssessmentConfig::preset(kind).num_questions();
            let topics = vec![
                SAMPLE_TOPICS[i % SAMPLE_TOPICS.len()].to_owned(),
                SAMPLE_TOPICS[(i + 1) % SAMPLE_TOPICS.len()].to_owned(),
            ];
            let ratio = 0.45 + 0.08 * f64::from(u32::try_from(i % 6).unwrap_or(0));
            let days_ago = i64::try_from(9 * (count - i)).unwrap_or_default();
            TestResult::new(
                kind,
                topics,
                (f64::from(total) * ratio).round(),
                total,
                now - Duration::days(days_ago),
            )
        })
        .collect()
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(cmd: Command, args: &[&str]) -> Result<Args, ArgsError> {
        let mut iter = args.iter().map(|s| (*s).to_string());
        Args::parse(cmd, &mut iter)
    }

    #[test]
    fn take_requires_kind_and_collects_topics() {
        let args = parse(
            Command::Take,
            &["iq-test", "--topic", "Logic", "--topic", "Series", "--questions", "5"],
        )
        .unwrap();
        assert_eq!(args.kind, Some(AssessmentKind::IqTest));
        assert_eq!(args.topics, vec!["Logic".to_string(), "Series".to_string()]);
        assert_eq!(args.num_questions, Some(5));

        assert_eq!(args.difficulty, None);

        assert!(matches!(parse(Command::Take, &[]), Err(ArgsError::MissingKind)));
        assert!(matches!(
            parse(Command::Take, &["weekly"]),
            Err(ArgsError::InvalidKind { .. })
        ));
    }

    #[test]
    fn take_accepts_difficulty_override() {
        let args = parse(Command::Take, &["gk-quiz", "--difficulty", "Easy"]).unwrap();
        assert_eq!(args.difficulty, Some(Difficulty::Easy));

        assert!(matches!(
            parse(Command::Take, &["gk-quiz", "--difficulty", "brutal"]),
            Err(ArgsError::InvalidDifficulty { .. })
        ));
        assert!(matches!(
            parse(Command::Stats, &["--difficulty", "easy"]),
            Err(ArgsError::UnknownArg(_))
        ));
    }

    #[test]
    fn clear_history_needs_confirmation() {
        assert!(matches!(
            parse(Command::ClearHistory, &[]),
            Err(ArgsError::ConfirmationRequired)
        ));
        assert!(parse(Command::ClearHistory, &["--yes"]).unwrap().confirmed);
    }

    #[test]
    fn flags_are_scoped_to_their_command() {
        assert!(matches!(
            parse(Command::Status, &["--yes"]),
            Err(ArgsError::UnknownArg(_))
        ));
        assert!(matches!(
            parse(Command::Seed, &["--count", "many"]),
            Err(ArgsError::InvalidNumber { flag: "--count", .. })
        ));
        let db = parse(Command::Stats, &["--db", "sqlite::memory:"]).unwrap();
        assert_eq!(db.db_url, "sqlite::memory:");
    }

    #[test]
    fn sample_results_are_valid_and_chronological() {
        let now = Utc::now();
        let samples = sample_results(now, 6).unwrap();
        assert_eq!(samples.len(), 6);
        assert!(samples.windows(2).all(|w| w[0].timestamp() < w[1].timestamp()));
        assert!(samples.iter().all(|r| r.score() <= f64::from(r.total_questions())));
        assert!(samples.iter().all(|r| r.timestamp() < now));
    }

    #[test]
    fn option_letters_round_trip() {
        for i in 0..4 {
            let letter = option_letter(i).to_string();
            assert_eq!(option_index(&letter), Some(i));
        }
        assert_eq!(option_index("e"), None);
    }
}
