use std::path::{Path, PathBuf};

use anyhow::{Context, bail};

use crate::audio::{SampleBuffer, SampleId, next_sample_id};

// every .wav in `dir`, sorted by file name so slot numbers are stable
pub fn index_wav_in_dir(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("could not list samples in {}", dir.display()))?;
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_wav = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));
        if is_wav && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

// slot k plays the k-th file, wrapping when there are fewer files than slots
pub fn path_for_slot(paths: &[PathBuf], slot: usize) -> anyhow::Result<&Path> {
    if paths.is_empty() {
        bail!("no .wav files to play slot {slot}");
    }
    Ok(&paths[slot % paths.len()])
}

// Load a WAV from disk, prepare for registration with the engine
pub fn load(path: &Path, target_rate: u32) -> anyhow::Result<(SampleId, SampleBuffer)> {
    let id = next_sample_id();
    let buffer = SampleBuffer::load_wav(path, target_rate)?;
    Ok((id, buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::write_wav;

    #[test]
    fn index_is_sorted_and_wav_only() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("b_snare.wav"), 1000, 1, &[1]);
        write_wav(&dir.path().join("a_kick.WAV"), 1000, 1, &[1]);
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("sub.wav")).unwrap();

        let paths = index_wav_in_dir(dir.path()).unwrap();
        let names: Vec<_> = paths.iter().map(|p| p.file_name().unwrap().to_string_lossy().into_owned()).collect();
        assert_eq!(names, vec!["a_kick.WAV", "b_snare.wav"]);
    }

    #[test]
    fn slots_wrap_over_the_files() {
        let paths = vec![PathBuf::from("a.wav"), PathBuf::from("b.wav")];
        assert_eq!(path_for_slot(&paths, 0).unwrap(), Path::new("a.wav"));
        assert_eq!(path_for_slot(&paths, 3).unwrap(), Path::new("b.wav"));
        assert!(path_for_slot(&[], 0).is_err());
    }

    #[test]
    fn load_hands_out_fresh_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hit.wav");
        write_wav(&path, 1000, 1, &[0, 100, 200]);
        let (a, buf) = load(&path, 1000).unwrap();
        let (b, _) = load(&path, 1000).unwrap();
        assert_ne!(a, b);
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn missing_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = index_wav_in_dir(&dir.path().join("nope")).unwrap_err();
        assert!(err.to_string().contains("could not list samples"));
    }
}
