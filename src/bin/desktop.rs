// Prevents additional console window on Windows in release, DO NOT REMOVE!!
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

fn main() {
    if let Err(e) = region_annotator::logging::init_tracing() {
        eprintln!("Failed to initialize logging: {}", e);
    }
    region_annotator::run()
}
