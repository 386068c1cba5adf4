use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{debug, warn};

mod config;
mod db;
mod dkd;
mod envelope;
mod files;
mod model;
mod pdf;
mod worker;

use config::Config;
use db::Database;
use model::{ProcessedFile, ToolKind};
use worker::{Job, Worker};

#[derive(Parser, Debug)]
#[command(version, about = "File compression, encryption and PDF tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// DKD-encode files
    Compress(CodecArgs),
    /// Invert a DKD encode
    Decompress(CodecArgs),
    /// Generate an RSA key pair for the envelope tools
    Keygen {
        /// Directory for securezip.key / securezip.pub
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// Encrypt a file with a fresh AES key wrapped by an RSA public key
    Encrypt {
        input: PathBuf,
        #[arg(short, long)]
        public_key: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Decrypt an envelope using its `.meta.json` sidecar and a private key
    Decrypt {
        input: PathBuf,
        #[arg(short, long)]
        private_key: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// PDF tools
    #[command(subcommand)]
    Pdf(PdfCommand),
    /// Processing history
    #[command(subcommand)]
    History(HistoryCommand),
    /// Show or change settings
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the active settings
    Show,
    /// Set the default output directory
    SetOutputDir { dir: PathBuf },
    /// Set the history database location
    SetHistoryDb { path: PathBuf },
}

#[derive(Args, Debug)]
struct CodecArgs {
    /// Input files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Text key the permutation is derived from
    #[arg(short, long)]
    key: String,
    /// Directory for outputs (defaults to the configured directory, then
    /// the input's own)
    #[arg(short, long)]
    out_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum PdfCommand {
    /// Merge PDFs into one
    Merge {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write each page as its own PDF
    Split {
        input: PathBuf,
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },
    /// Keep only the listed pages, e.g. "1-3,5"
    Extract {
        input: PathBuf,
        #[arg(short, long)]
        pages: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Set the rotation of every page
    Rotate {
        input: PathBuf,
        #[arg(short, long)]
        degrees: i64,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Stamp text across every page
    Watermark {
        input: PathBuf,
        #[arg(short, long)]
        text: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryCommand {
    /// Show ledger entries, newest first
    List {
        /// Only entries from one tool
        #[arg(short, long)]
        tool: Option<String>,
    },
    /// Print one entry as JSON
    Show { id: String },
    /// Dump the ledger as JSON
    Export {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Remove one entry by id
    Delete { id: String },
    /// Remove all entries
    Clear,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = Config::load().unwrap_or_else(|e| {
        warn!("ignoring config: {e:#}");
        Config::default()
    });
    debug!("configured output dir: {:?}", config.output_dir);

    match cli.command {
        Command::Compress(args) => run_codec(args, &config, false),
        Command::Decompress(args) => run_codec(args, &config, true),
        Command::Keygen { dir } => run_keygen(dir, &config),
        Command::Encrypt {
            input,
            public_key,
            output,
        } => run_encrypt(input, public_key, output, &config),
        Command::Decrypt {
            input,
            private_key,
            output,
        } => run_decrypt(input, private_key, output, &config),
        Command::Pdf(cmd) => run_pdf(cmd, &config),
        Command::History(cmd) => run_history(cmd, &config),
        Command::Config(cmd) => run_config(cmd, config),
    }
}

fn run_config(cmd: ConfigCommand, mut config: Config) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigCommand::SetOutputDir { dir } => {
            config.output_dir = Some(dir);
            config.save()?;
            println!("wrote {}", config::config_path()?.display());
        }
        ConfigCommand::SetHistoryDb { path } => {
            config.history_db = Some(path);
            config.save()?;
            println!("wrote {}", config::config_path()?.display());
        }
    }
    Ok(())
}

fn run_codec(args: CodecArgs, config: &Config, decode: bool) -> Result<()> {
    if args.key.is_empty() {
        bail!("key must not be empty");
    }

    let db_path = config.history_db_path()?;
    let db = Database::new(&db_path)?;
    let tool = if decode {
        ToolKind::Decompress
    } else {
        ToolKind::Compress
    };
    let out_dir = args.out_dir.as_deref().or(config.output_dir.as_deref());

    // Record everything up front, then let the worker drain the queue.
    let mut jobs = Vec::with_capacity(args.inputs.len());
    for input in &args.inputs {
        let size = std::fs::metadata(input).map(|m| m.len()).unwrap_or(0);
        let record = ProcessedFile::new(files::display_name(input), size, tool);
        db.insert(&record)
            .with_context(|| format!("recording {}", input.display()))?;

        let name = if decode {
            files::decoded_name(input)
        } else {
            files::encoded_name(input)
        };
        let output = files::resolve_output(input, &name, None, out_dir);
        let job = if decode {
            Job::Decode {
                record_id: record.id,
                input: input.clone(),
                output,
                key: args.key.clone(),
            }
        } else {
            Job::Encode {
                record_id: record.id,
                input: input.clone(),
                output,
                key: args.key.clone(),
            }
        };
        jobs.push(job);
    }

    let (tx, rx) = std::sync::mpsc::channel();
    let handle = Worker::new(rx, db_path).start();
    for job in jobs {
        tx.send(job).map_err(|_| anyhow!("worker is gone"))?;
    }
    drop(tx);
    handle
        .join()
        .map_err(|_| anyhow!("worker thread panicked"))?;
    Ok(())
}

fn run_keygen(dir: Option<PathBuf>, config: &Config) -> Result<()> {
    let dir = match dir.or_else(|| config.output_dir.clone()) {
        Some(dir) => dir,
        None => std::env::current_dir().context("no working directory")?,
    };

    let (private_pem, public_pem) = envelope::generate_keypair()?;
    let private_path = dir.join("securezip.key");
    let public_path = dir.join("securezip.pub");
    files::write_bytes(&private_path, private_pem.as_bytes())?;
    files::write_bytes(&public_path, public_pem.as_bytes())?;
    println!("wrote {}", private_path.display());
    println!("wrote {}", public_path.display());
    Ok(())
}

fn run_encrypt(
    input: PathBuf,
    public_key: PathBuf,
    output: Option<PathBuf>,
    config: &Config,
) -> Result<()> {
    let public_pem = std::fs::read_to_string(&public_key)
        .with_context(|| format!("failed to read {}", public_key.display()))?;
    let data = files::read_bytes(&input)?;

    let sealed = envelope::seal(&data, &public_pem)?;
    let sidecar = envelope::Sidecar::new(&sealed);

    let db = Database::new(config.history_db_path()?)?;
    let mut record =
        ProcessedFile::new(files::display_name(&input), data.len() as u64, ToolKind::Encrypt);
    record.encrypted_key = Some(sidecar.encrypted_key.clone());
    record.iv = Some(sidecar.iv.clone());
    db.insert(&record)?;

    let name = files::sealed_name(&input);
    let output = files::resolve_output(&input, &name, output.as_deref(), config.output_dir.as_deref());
    files::write_bytes(&output, &sealed.ciphertext)?;
    let sidecar_path = envelope::sidecar_path(&output);
    files::write_bytes(&sidecar_path, serde_json::to_string_pretty(&sidecar)?.as_bytes())?;

    db.mark_completed(
        &record.id,
        sealed.ciphertext.len() as u64,
        &output.display().to_string(),
    )?;
    println!(
        "{} -> {} (+ {})",
        input.display(),
        output.display(),
        sidecar_path.display()
    );
    Ok(())
}

fn run_decrypt(
    input: PathBuf,
    private_key: PathBuf,
    output: Option<PathBuf>,
    config: &Config,
) -> Result<()> {
    let private_pem = std::fs::read_to_string(&private_key)
        .with_context(|| format!("failed to read {}", private_key.display()))?;
    let ciphertext = files::read_bytes(&input)?;

    let sidecar_path = envelope::sidecar_path(&input);
    let sidecar: envelope::Sidecar = serde_json::from_str(
        &std::fs::read_to_string(&sidecar_path)
            .with_context(|| format!("missing sidecar {}", sidecar_path.display()))?,
    )
    .with_context(|| format!("malformed sidecar {}", sidecar_path.display()))?;

    let db = Database::new(config.history_db_path()?)?;
    let record = ProcessedFile::new(
        files::display_name(&input),
        ciphertext.len() as u64,
        ToolKind::Decrypt,
    );
    db.insert(&record)?;

    let plaintext = match envelope::open(
        &ciphertext,
        &sidecar.wrapped_key()?,
        &sidecar.iv()?,
        &private_pem,
    ) {
        Ok(plaintext) => plaintext,
        Err(e) => {
            let _ = db.mark_failed(&record.id);
            return Err(e);
        }
    };

    let name = files::opened_name(&input);
    let output = files::resolve_output(&input, &name, output.as_deref(), config.output_dir.as_deref());
    files::write_bytes(&output, &plaintext)?;
    db.mark_completed(
        &record.id,
        plaintext.len() as u64,
        &output.display().to_string(),
    )?;
    println!("{} -> {}", input.display(), output.display());
    Ok(())
}

/// Marks the ledger entry failed when a step errors out, then propagates.
fn finish<T>(db: &Database, record_id: &str, result: Result<T>) -> Result<T> {
    if result.is_err() {
        let _ = db.mark_failed(record_id);
    }
    result
}

fn run_pdf(cmd: PdfCommand, config: &Config) -> Result<()> {
    let db = Database::new(config.history_db_path()?)?;
    let out_dir = config.output_dir.as_deref();

    match cmd {
        PdfCommand::Merge { inputs, output } => {
            let total: u64 = inputs
                .iter()
                .filter_map(|p| std::fs::metadata(p).ok())
                .map(|m| m.len())
                .sum();
            let first = inputs[0].clone();
            let record = ProcessedFile::new(files::display_name(&first), total, ToolKind::Merge);
            db.insert(&record)?;

            let docs: Result<Vec<_>> = inputs.iter().map(|p| pdf::load(p)).collect();
            let mut merged = finish(&db, &record.id, docs.and_then(pdf::merge))?;

            let name = files::suffixed_pdf_name(&first, "merged");
            let output = files::resolve_output(&first, &name, output.as_deref(), out_dir);
            let size = finish(&db, &record.id, pdf::save(&mut merged, &output))?;
            db.mark_completed(&record.id, size, &output.display().to_string())?;
            println!("merged {} files -> {}", inputs.len(), output.display());
        }
        PdfCommand::Split { input, out_dir: flag_dir } => {
            let input_size = std::fs::metadata(&input).map(|m| m.len()).unwrap_or(0);
            let doc = pdf::load(&input)?;
            let parts = pdf::split(&doc)?;
            let dir = flag_dir.as_deref().or(out_dir);

            for (index, mut part) in parts.into_iter().enumerate() {
                let page = index as u32 + 1;
                let name = files::page_pdf_name(&input, page);
                let record = ProcessedFile::new(name.clone(), input_size, ToolKind::Split);
                db.insert(&record)?;

                let output = files::resolve_output(&input, &name, None, dir);
                let size = finish(&db, &record.id, pdf::save(&mut part, &output))?;
                db.mark_completed(&record.id, size, &output.display().to_string())?;
                println!("page {page} -> {}", output.display());
            }
        }
        PdfCommand::Extract { input, pages, output } => {
            let pages = pdf::parse_page_ranges(&pages)?;
            let input_size = std::fs::metadata(&input).map(|m| m.len()).unwrap_or(0);
            let record = ProcessedFile::new(files::display_name(&input), input_size, ToolKind::Extract);
            db.insert(&record)?;

            let doc = finish(&db, &record.id, pdf::load(&input))?;
            let mut extracted = finish(&db, &record.id, pdf::extract(&doc, &pages))?;

            let name = files::suffixed_pdf_name(&input, "extracted");
            let output = files::resolve_output(&input, &name, output.as_deref(), out_dir);
            let size = finish(&db, &record.id, pdf::save(&mut extracted, &output))?;
            db.mark_completed(&record.id, size, &output.display().to_string())?;
            println!("{} pages -> {}", pages.len(), output.display());
        }
        PdfCommand::Rotate { input, degrees, output } => {
            let input_size = std::fs::metadata(&input).map(|m| m.len()).unwrap_or(0);
            let record = ProcessedFile::new(files::display_name(&input), input_size, ToolKind::Rotate);
            db.insert(&record)?;

            let mut doc = finish(&db, &record.id, pdf::load(&input))?;
            finish(&db, &record.id, pdf::rotate(&mut doc, degrees))?;

            let name = files::suffixed_pdf_name(&input, "rotated");
            let output = files::resolve_output(&input, &name, output.as_deref(), out_dir);
            let size = finish(&db, &record.id, pdf::save(&mut doc, &output))?;
            db.mark_completed(&record.id, size, &output.display().to_string())?;
            println!("rotated -> {}", output.display());
        }
        PdfCommand::Watermark { input, text, output } => {
            let input_size = std::fs::metadata(&input).map(|m| m.len()).unwrap_or(0);
            let record = ProcessedFile::new(files::display_name(&input), input_size, ToolKind::Watermark);
            db.insert(&record)?;

            let mut doc = finish(&db, &record.id, pdf::load(&input))?;
            finish(&db, &record.id, pdf::watermark(&mut doc, &text))?;

            let name = files::suffixed_pdf_name(&input, "watermarked");
            let output = files::resolve_output(&input, &name, output.as_deref(), out_dir);
            let size = finish(&db, &record.id, pdf::save(&mut doc, &output))?;
            db.mark_completed(&record.id, size, &output.display().to_string())?;
            println!("watermarked -> {}", output.display());
        }
    }
    Ok(())
}

fn run_history(cmd: HistoryCommand, config: &Config) -> Result<()> {
    let db = Database::new(config.history_db_path()?)?;

    match cmd {
        HistoryCommand::List { tool } => {
            let entries = match tool {
                Some(tool) => {
                    let kind = ToolKind::parse(&tool)
                        .with_context(|| format!("unknown tool {tool:?}"))?;
                    db.list_by_tool(kind)?
                }
                None => db.list()?,
            };
            if entries.is_empty() {
                println!("history is empty");
                return Ok(());
            }
            for entry in entries {
                println!(
                    "{}  {:<10}  {:<10}  {:>10} -> {:>10}  {}",
                    entry.id,
                    entry.tool,
                    entry.status,
                    entry.original_size,
                    entry.processed_size,
                    entry.file_name,
                );
            }
        }
        HistoryCommand::Show { id } => {
            let entry = db
                .get(&id)?
                .with_context(|| format!("no history entry {id:?}"))?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
        HistoryCommand::Export { output } => {
            let entries = db.list()?;
            let json = serde_json::to_string_pretty(&entries)?;
            match output {
                Some(path) => {
                    files::write_bytes(&path, json.as_bytes())?;
                    println!("wrote {}", path.display());
                }
                None => println!("{json}"),
            }
        }
        HistoryCommand::Delete { id } => {
            if db.delete(&id)? {
                println!("deleted {id}");
            } else {
                bail!("no history entry {id}");
            }
        }
        HistoryCommand::Clear => {
            let removed = db.clear()?;
            println!("removed {removed} entries");
        }
    }
    Ok(())
}
