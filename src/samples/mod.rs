use include_dir::{include_dir, Dir};
use rand::seq::SliceRandom;

static SAMPLES_DIR: Dir = include_dir!("src/samples");

/// A bundled practice passage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub name: &'static str,
    pub text: &'static str,
}

/// All bundled passages, sorted by name
pub fn all() -> Vec<Sample> {
    let mut samples: Vec<Sample> = SAMPLES_DIR
        .files()
        .filter(|f| f.path().extension().is_some_and(|ext| ext == "txt"))
        .filter_map(|f| {
            Some(Sample {
                name: f.path().file_stem()?.to_str()?,
                text: f.contents_utf8()?.trim(),
            })
        })
        .collect();
    samples.sort_by_key(|s| s.name);
    samples
}

pub fn by_name(name: &str) -> Option<Sample> {
    all().into_iter().find(|s| s.name == name)
}

pub fn random() -> Option<Sample> {
    all().choose(&mut rand::thread_rng()).copied()
}
