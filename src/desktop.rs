//! Webview shell: IPC commands over the library, plus the editor session and
//! settings held in managed state.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tauri::{AppHandle, Emitter, Manager, State};
use crate::batch::{self, BatchProgress, BatchReport};
use crate::config::{AppConfig, DEFAULT_CONFIG_FILE};
use crate::crop::{self, CropReport};
use crate::error::{AnnotatorError, Result};
use crate::filter::FilterSettings;
use crate::loader;
use crate::paste::{self, PasteOutcome};
use crate::pdf;
use crate::preview;
use crate::region::{Point, Rect};
use crate::session::{EditorSession, LoadedImage, Mode};

struct ConfigState {
    path: PathBuf,
    config: Mutex<AppConfig>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| AnnotatorError::Processing("state lock poisoned".to_string()))
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AnnotatorError::Processing(format!("Task join error: {}", e)))?
}

// Editor commands

#[tauri::command]
fn open_image(session: State<Mutex<EditorSession>>, path: String) -> Result<LoadedImage> {
    lock(&session)?.load_image(Path::new(&path)).cloned()
}

#[tauri::command]
fn set_mode(session: State<Mutex<EditorSession>>, mode: Mode) -> Result<Mode> {
    let mut session = lock(&session)?;
    session.set_mode(mode);
    Ok(session.mode())
}

#[derive(serde::Serialize)]
struct EditorState {
    mode: Mode,
    rects: Vec<Rect>,
}

/// Pointer pressed: erases in erase mode, starts a rectangle in draw mode.
#[tauri::command]
fn pointer_down(session: State<Mutex<EditorSession>>, x: f32, y: f32) -> Result<EditorState> {
    let mut session = lock(&session)?;
    let at = Point::new(x, y);
    match session.mode() {
        Mode::Erase => {
            session.erase_at(at)?;
        }
        Mode::Draw => {
            session.begin_draw(at)?;
        }
        Mode::Pan => {}
    }
    Ok(EditorState {
        mode: session.mode(),
        rects: session.rects().to_vec(),
    })
}

#[tauri::command]
fn pointer_move(session: State<Mutex<EditorSession>>, x: f32, y: f32) -> Result<Option<Rect>> {
    let mut session = lock(&session)?;
    if session.update_draw(Point::new(x, y)) {
        Ok(session.rects().last().copied())
    } else {
        Ok(None)
    }
}

#[tauri::command]
fn pointer_up(session: State<Mutex<EditorSession>>) -> Result<Option<Rect>> {
    Ok(lock(&session)?.end_draw())
}

#[tauri::command]
fn move_region(
    session: State<Mutex<EditorSession>>,
    index: usize,
    dx: f32,
    dy: f32,
) -> Result<Vec<Rect>> {
    let mut session = lock(&session)?;
    session.move_region(index, dx, dy)?;
    Ok(session.rects().to_vec())
}

#[tauri::command]
fn list_regions(session: State<Mutex<EditorSession>>) -> Result<Vec<Rect>> {
    Ok(lock(&session)?.rects().to_vec())
}

#[tauri::command]
fn clear_regions(session: State<Mutex<EditorSession>>) -> Result<()> {
    lock(&session)?.clear();
    Ok(())
}

#[tauri::command]
async fn preview_png(session: State<'_, Mutex<EditorSession>>) -> Result<Vec<u8>> {
    let (path, rects) = {
        let session = lock(&session)?;
        let loaded = session.image().ok_or(AnnotatorError::NoImageLoaded)?;
        (loaded.path.clone(), session.rects().to_vec())
    };
    blocking(move || {
        let image = loader::open_image(&path)?;
        preview::encode_png(&preview::render_regions(&image, &rects))
    })
    .await
}

// Processing commands

#[tauri::command]
async fn crop_regions_command(
    session: State<'_, Mutex<EditorSession>>,
    settings: State<'_, ConfigState>,
    output_dir: Option<String>,
) -> Result<CropReport> {
    let snapshot = lock(&session)?.clone();
    let output_dir = match output_dir {
        Some(dir) => PathBuf::from(dir),
        None => lock(&settings.config)?.crops_dir.clone(),
    };
    blocking(move || crop::crop_session(&snapshot, &output_dir)).await
}

#[tauri::command]
async fn filter_directory_command(
    app: AppHandle,
    settings: State<'_, ConfigState>,
    input_dir: String,
    output_dir: String,
    filter: Option<FilterSettings>,
) -> Result<BatchReport> {
    let filter = match filter {
        Some(filter) => filter,
        None => lock(&settings.config)?.filter.clone(),
    };
    let input = PathBuf::from(input_dir);
    let output = PathBuf::from(output_dir);

    let report = {
        let (input, output, filter) = (input.clone(), output.clone(), filter.clone());
        blocking(move || {
            batch::process_directory_with_progress(&input, &output, &filter, |progress: BatchProgress| {
                let _ = app.emit("filter-progress", progress);
            })
        })
        .await?
    };

    let mut config = lock(&settings.config)?;
    config.filter = filter;
    config.last_input_dir = Some(input);
    config.last_output_dir = Some(output);
    config.save(&settings.path)?;

    Ok(report)
}

#[tauri::command]
async fn paste_regions_command(
    manifest_path: String,
    image_path: String,
    edited_dir: String,
    output_path: String,
) -> Result<Vec<PasteOutcome>> {
    blocking(move || {
        paste::paste_files(
            Path::new(&manifest_path),
            Path::new(&image_path),
            Path::new(&edited_dir),
            Path::new(&output_path),
        )
        .map(|report| report.outcomes)
    })
    .await
}

#[tauri::command]
async fn export_pdf_command(png_path: String, pdf_name: String) -> Result<String> {
    blocking(move || {
        let pdf_path = pdf::pdf_path_for_name(&pdf_name);
        pdf::png_to_pdf(Path::new(&png_path), &pdf_path)?;
        Ok(pdf_path.to_string_lossy().to_string())
    })
    .await
}

// Settings commands

#[tauri::command]
fn get_filter_settings(settings: State<ConfigState>) -> Result<FilterSettings> {
    Ok(lock(&settings.config)?.filter.clone())
}

#[tauri::command]
fn set_filter_settings(settings: State<ConfigState>, filter: FilterSettings) -> Result<()> {
    filter.check()?;
    let mut config = lock(&settings.config)?;
    config.filter = filter;
    config.save(&settings.path)
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_dialog::init())
        .plugin(tauri_plugin_fs::init())
        .setup(|app| {
            let app_dir = app.path().app_data_dir()?;
            std::fs::create_dir_all(&app_dir)?;

            let config_path = app_dir.join(DEFAULT_CONFIG_FILE);
            let config = AppConfig::load_or_default(&config_path);

            app.manage(Mutex::new(EditorSession::new()));
            app.manage(ConfigState {
                path: config_path,
                config: Mutex::new(config),
            });

            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            open_image,
            set_mode,
            pointer_down,
            pointer_move,
            pointer_up,
            move_region,
            list_regions,
            clear_regions,
            preview_png,
            crop_regions_command,
            filter_directory_command,
            paste_regions_command,
            export_pdf_command,
            get_filter_settings,
            set_filter_settings,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
