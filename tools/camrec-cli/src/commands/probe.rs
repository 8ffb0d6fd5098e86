//! Print a stream's native properties.

use camrec_capture_engine::{GstBackend, MediaBackend, SourceTimeouts};
use camrec_common::config::AppConfig;

pub fn run(config: &AppConfig, url: &str) -> anyhow::Result<()> {
    let backend = GstBackend::new()?;
    let timeouts = SourceTimeouts {
        open: config.recording.open_timeout(),
        read: config.recording.read_timeout(),
    };

    println!("Probing {url}");
    let source = backend.open_source("probe", url, timeouts)?;
    let properties = source.properties();
    source.close();

    println!("  Width:  {}", properties.width);
    println!("  Height: {}", properties.height);
    if properties.fps > 0.0 {
        println!("  FPS:    {:.2}", properties.fps);
    } else {
        println!("  FPS:    unknown");
    }

    Ok(())
}
