//! Check the camera list and GStreamer capabilities.

use std::path::PathBuf;

use camrec_camera_model::CameraList;
use camrec_capture_engine::GstBackend;

pub fn run(cameras: PathBuf) -> anyhow::Result<()> {
    println!("camrec System Check");
    println!("{}", "=".repeat(50));

    let cameras_ok = match CameraList::load(&cameras) {
        Ok(list) => {
            println!(
                "[OK] Camera list: {} camera(s) in {}",
                list.len(),
                cameras.display()
            );
            for camera in &list {
                println!("     {:<16} {}", camera.name, camera.url);
            }
            true
        }
        Err(e) => {
            println!("[FAIL] Camera list: {e}");
            false
        }
    };

    println!();
    let elements_ok = match GstBackend::new() {
        Ok(backend) => {
            println!("GStreamer elements:");
            println!("{}", "-".repeat(50));
            let checks = backend.check_elements();
            for check in &checks {
                let status = if check.available {
                    "[OK]"
                } else if check.required {
                    "[MISSING - REQUIRED]"
                } else {
                    "[MISSING - OPTIONAL]"
                };
                println!("  {status} {}", check.name);
            }
            checks.iter().filter(|c| c.required).all(|c| c.available)
        }
        Err(e) => {
            println!("[FAIL] GStreamer: {e}");
            false
        }
    };

    println!();
    if cameras_ok && elements_ok {
        println!("Everything required is available. camrec is ready.");
    } else {
        println!("Some requirements are missing. See above.");
    }

    Ok(())
}
