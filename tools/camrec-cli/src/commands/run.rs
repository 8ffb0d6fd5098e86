//! View and record cameras, controlled from stdin.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use camrec_camera_model::{CameraId, CameraList};
use camrec_capture_engine::{
    CameraStatus, GstBackend, RecordTransition, SessionRegistry, SessionSettings, ViewTransition,
};
use camrec_common::config::AppConfig;
use tokio::sync::mpsc;

type SharedRegistry = Arc<Mutex<SessionRegistry>>;

/// A line command read from stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    View(CameraId),
    Record(CameraId),
    Status { json: bool },
    Help,
    Quit,
}

impl ControlCommand {
    /// Parse one input line. Blank lines yield `Ok(None)`.
    ///
    /// Camera names may contain spaces; everything after the verb is the
    /// name.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let camera = |verb: &str| {
            if rest.is_empty() {
                Err(format!("`{verb}` needs a camera name"))
            } else {
                Ok(CameraId::from(rest))
            }
        };

        let command = match verb {
            "view" | "v" => Self::View(camera(verb)?),
            "record" | "r" => Self::Record(camera(verb)?),
            "status" | "s" => match rest {
                "" => Self::Status { json: false },
                "--json" | "json" => Self::Status { json: true },
                other => return Err(format!("unknown status option `{other}`")),
            },
            "help" | "?" => Self::Help,
            "quit" | "q" | "exit" => Self::Quit,
            other => return Err(format!("unknown command `{other}` (try `help`)")),
        };
        Ok(Some(command))
    }
}

pub async fn run(
    config: AppConfig,
    cameras: PathBuf,
    view: Vec<String>,
    record: Vec<String>,
) -> anyhow::Result<()> {
    let list = CameraList::load(&cameras)
        .with_context(|| format!("Failed to load camera list {}", cameras.display()))?;
    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            config.output_dir.display()
        )
    })?;

    let backend = GstBackend::new()?;
    let settings = SessionSettings::from_config(&config);

    println!("camrec: {} camera(s) from {}", list.len(), cameras.display());
    println!("  Output: {}", settings.output_dir.display());
    println!("  Segment rate: {} fps", settings.segment_fps);
    println!("  Display: {}", if settings.display { "on" } else { "off" });
    println!();

    let view: Vec<CameraId> = if view.is_empty() {
        list.iter().map(|camera| camera.id()).collect()
    } else {
        view.into_iter().map(CameraId::from).collect()
    };
    let record: Vec<CameraId> = record.into_iter().map(CameraId::from).collect();

    let registry: SharedRegistry = Arc::new(Mutex::new(SessionRegistry::new(
        list,
        Arc::new(backend),
        settings,
    )));

    with_registry(&registry, move |registry| -> anyhow::Result<()> {
        for id in &view {
            registry.toggle_view(id)?;
        }
        for id in &record {
            if !registry.snapshot(id)?.viewing {
                registry.toggle_view(id)?;
            }
            registry.toggle_record(id)?;
        }
        Ok(())
    })
    .await??;

    println!("Commands: view <name>, record <name>, status, quit. Ctrl+C also stops.");
    let result = control_loop(&registry).await;

    let reports = with_registry(&registry, |registry| registry.shutdown()).await?;
    println!();
    for report in &reports {
        println!(
            "{}: {} frame(s) read, {} written to {} segment(s)",
            report.camera,
            report.frames_read,
            report.frames_written,
            report.segments.len()
        );
        for path in &report.segments {
            println!("    {}", path.display());
        }
    }

    result
}

/// Lines buffered between the reader thread and the control loop.
const LINE_BUFFER: usize = 16;

/// Read lines on a plain thread and forward them to the runtime.
///
/// The thread is detached: a read blocked on stdin never holds up exit.
/// The channel closes on end of input or a read error.
fn spawn_line_reader<R>(reader: R) -> anyhow::Result<mpsc::Receiver<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(LINE_BUFFER);
    std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in reader.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::error!(error = %e, "Control input not readable");
                        break;
                    }
                };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        })
        .context("Failed to spawn stdin reader thread")?;
    Ok(rx)
}

async fn control_loop(registry: &SharedRegistry) -> anyhow::Result<()> {
    let mut lines = spawn_line_reader(std::io::BufReader::new(std::io::stdin()))?;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                signal?;
                tracing::info!("Interrupted, shutting down");
                return Ok(());
            }
            line = lines.recv() => {
                let Some(line) = line else {
                    return Ok(());
                };
                match ControlCommand::parse(&line) {
                    Ok(Some(ControlCommand::Quit)) => return Ok(()),
                    Ok(Some(command)) => execute(registry, command).await?,
                    Ok(None) => {}
                    Err(message) => println!("{message}"),
                }
            }
        }
    }
}

async fn execute(registry: &SharedRegistry, command: ControlCommand) -> anyhow::Result<()> {
    match command {
        ControlCommand::View(id) => {
            let name = id.to_string();
            match with_registry(registry, move |r| r.toggle_view(&id)).await? {
                Ok(ViewTransition::Started) => println!("{name}: viewing"),
                Ok(ViewTransition::Stopped { report }) => match report {
                    Some(report) => println!(
                        "{name}: stopped ({} frame(s) written)",
                        report.frames_written
                    ),
                    None => println!("{name}: stopped (worker panicked)"),
                },
                Err(e) => println!("{e}"),
            }
        }
        ControlCommand::Record(id) => {
            let name = id.to_string();
            match with_registry(registry, move |r| r.toggle_record(&id)).await? {
                Ok(RecordTransition::Started) => println!("{name}: recording"),
                Ok(RecordTransition::Stopped) => println!("{name}: recording stopped"),
                Ok(RecordTransition::Ignored) => {
                    println!("{name}: not viewing, start the view first")
                }
                Err(e) => println!("{e}"),
            }
        }
        ControlCommand::Status { json } => {
            let statuses = with_registry(registry, |r| r.status()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&statuses)?);
            } else {
                print_status(&statuses);
            }
        }
        ControlCommand::Help => {
            println!("  view <name>     show or hide a camera");
            println!("  record <name>   start or stop recording a viewed camera");
            println!("  status [--json] list cameras");
            println!("  quit            stop everything and exit");
        }
        ControlCommand::Quit => {}
    }
    Ok(())
}

fn print_status(statuses: &[CameraStatus]) {
    for status in statuses {
        let state = &status.state;
        let note = if state.open_failed() {
            "  (stream did not open)"
        } else {
            ""
        };
        println!(
            "  {:<16} {:<8} {:<10} {:?}{}",
            status.camera.as_str(),
            if state.viewing { "viewing" } else { "-" },
            if state.recording { "recording" } else { "-" },
            state.phase,
            note
        );
    }
}

/// Run `f` against the registry on the blocking pool. Stopping a view joins
/// a worker thread, which must not happen on the async runtime.
async fn with_registry<T, F>(registry: &SharedRegistry, f: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut SessionRegistry) -> T + Send + 'static,
{
    let registry = Arc::clone(registry);
    tokio::task::spawn_blocking(move || {
        let mut guard = registry
            .lock()
            .map_err(|_| anyhow::anyhow!("camera registry lock poisoned"))?;
        Ok(f(&mut guard))
    })
    .await?
}
