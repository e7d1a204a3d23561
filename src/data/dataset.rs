use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use log::{info, warn};

use crate::data::image::load_image_input;
use crate::data::sample::Sample;
use crate::error::{NetError, Result};

/// Character encoded by a class folder name: the hexadecimal code point,
/// e.g. `4a` → `J`, `30` → `0`.
pub fn class_label(folder_name: &str) -> Option<char> {
    u32::from_str_radix(folder_name, 16).ok().and_then(char::from_u32)
}

/// One class folder found under the dataset root.
#[derive(Debug, Clone)]
struct ClassDir {
    label: char,
    images: PathBuf,
}

/// Image directory of a class: `<class>/train_<class>` when present,
/// otherwise the class folder itself.
fn image_dir(class_dir: &Path, name: &str) -> PathBuf {
    let nested = class_dir.join(format!("train_{}", name));
    if nested.is_dir() {
        nested
    } else {
        class_dir.to_path_buf()
    }
}

fn discover_classes(root: &Path) -> Result<Vec<ClassDir>> {
    let mut classes = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        match class_label(&name) {
            Some(label) => classes.push(ClassDir { label, images: image_dir(&path, &name) }),
            None => warn!("Ignoring folder {} (not a hexadecimal character code)", path.display()),
        }
    }
    classes.sort_by_key(|c| c.label);
    Ok(classes)
}

/// Loads every readable image of one class.  Unreadable files are skipped.
fn load_class(class: &ClassDir) -> Result<Vec<Sample>> {
    let mut files: Vec<PathBuf> = fs::read_dir(&class.images)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    let mut samples = Vec::with_capacity(files.len());
    for file in files {
        match load_image_input(&file) {
            Ok(input) => samples.push(Sample::new(input, class.label)),
            Err(e) => warn!("Could not read {}, continuing with other files: {}", file.display(), e),
        }
    }
    info!("Loaded {} images for {:?}", samples.len(), class.label);
    Ok(samples)
}

/// Loads a labelled image dataset rooted at `root`.
///
/// `root` holds one folder per class, named by the hexadecimal code point of
/// its character.  Each class is decoded on its own worker thread; the
/// dataset is returned only once every worker has finished, ordered by label.
pub fn load_dataset<P: AsRef<Path>>(root: P) -> Result<Vec<Sample>> {
    let root = root.as_ref();
    let classes = discover_classes(root)?;
    info!("Loading {} classes from {}", classes.len(), root.display());

    let per_class: Vec<Result<Vec<Sample>>> = thread::scope(|scope| {
        let handles: Vec<_> = classes
            .iter()
            .map(|class| (class.label, scope.spawn(move || load_class(class))))
            .collect();
        handles
            .into_iter()
            .map(|(label, handle)| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(NetError::Image(format!("loader for {:?} panicked", label))))
            })
            .collect()
    });

    let mut samples = Vec::new();
    for class in per_class {
        samples.extend(class?);
    }
    info!("Number of files loaded: {}", samples.len());
    Ok(samples)
}
