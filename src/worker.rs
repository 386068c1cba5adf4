use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};

use log::{error, info};

use crate::db::Database;
use crate::dkd;
use crate::files;

pub enum Job {
    Encode {
        record_id: String,
        input: PathBuf,
        output: PathBuf,
        key: String,
    },
    Decode {
        record_id: String,
        input: PathBuf,
        output: PathBuf,
        key: String,
    },
}

pub struct Worker {
    receiver: Receiver<Job>,
    db_path: PathBuf,
}

impl Worker {
    pub fn new(receiver: Receiver<Job>, db_path: PathBuf) -> Self {
        Self { receiver, db_path }
    }

    /// Runs jobs on a dedicated thread with its own database connection.
    /// The thread exits once every sender is dropped; join the handle to
    /// wait for the queue to drain.
    pub fn start(self) -> JoinHandle<()> {
        let Worker { receiver, db_path } = self;
        thread::spawn(move || {
            let db = match Database::new(&db_path) {
                Ok(db) => db,
                Err(e) => {
                    error!("worker could not open history db: {e:#}");
                    return;
                }
            };

            for job in receiver {
                match job {
                    Job::Encode {
                        record_id,
                        input,
                        output,
                        key,
                    } => Self::run_codec(&db, &record_id, &input, &output, &key, false),
                    Job::Decode {
                        record_id,
                        input,
                        output,
                        key,
                    } => Self::run_codec(&db, &record_id, &input, &output, &key, true),
                }
            }
        })
    }

    fn run_codec(
        db: &Database,
        record_id: &str,
        input: &Path,
        output: &Path,
        key: &str,
        decode: bool,
    ) {
        match Self::transform(input, output, key, decode) {
            Ok(size) => {
                if let Err(e) = db.mark_completed(record_id, size, &output.display().to_string()) {
                    error!("could not update history entry {record_id}: {e}");
                }
                info!("processed {}", input.display());
                println!("{} -> {}", input.display(), output.display());
            }
            Err(e) => {
                if let Err(db_err) = db.mark_failed(record_id) {
                    error!("could not update history entry {record_id}: {db_err}");
                }
                error!("failed to process {}: {e:#}", input.display());
                eprintln!("failed to process {}: {e:#}", input.display());
            }
        }
    }

    fn transform(input: &Path, output: &Path, key: &str, decode: bool) -> anyhow::Result<u64> {
        let data = files::read_bytes(input)?;
        let transformed = if decode {
            dkd::decode(&data, key)?
        } else {
            dkd::encode(&data, key)?
        };
        files::write_bytes(output, &transformed)?;
        Ok(transformed.len() as u64)
    }
}
