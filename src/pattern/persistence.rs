// reading and writing track files; `.json` is the serde form, anything
// else is treated as a generated live-coding script
use std::path::Path;

use anyhow::Context;

use crate::pattern::track::Track;
use crate::script;

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

pub fn load_track(path: &Path) -> anyhow::Result<Track> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("could not read {}", path.display()))?;
    let track = if is_json(path) {
        serde_json::from_str(&data)
            .with_context(|| format!("{} is not a valid track", path.display()))?
    } else {
        let fallback_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        script::read_track(&data, &fallback_name)
            .with_context(|| format!("could not read script {}", path.display()))?
    };
    track.validate()?;
    Ok(track)
}

// Save the track to disk, making the parent directories if they don't exist already
pub fn save_track(path: &Path, track: &Track) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let contents = if is_json(path) {
        serde_json::to_string_pretty(track)?
    } else {
        script::render(track)
    };
    std::fs::write(path, contents)
        .with_context(|| format!("could not write {}", path.display()))?;
    Ok(())
}
