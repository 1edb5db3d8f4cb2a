//! Reading and writing configuration files.

use anyhow::{Context, Result};
use std::{
    fs::{self, File},
    io::{self, BufReader, Read, Write},
    path::Path,
};

/// Reads the RON (Rusty Object Notation) file at the given path and returns
/// the deserialized value of type `T`.
///
/// # Errors
/// Returns an error if the file can not be read or does not contain a valid
/// `T`.
pub fn parse_ron_file<T>(file_path: impl AsRef<Path>) -> Result<T>
where
    T: for<'de> serde::de::Deserialize<'de>,
{
    let file_path = file_path.as_ref();

    let text = read_text_file(file_path)
        .map_err(anyhow::Error::from)
        .with_context(|| format!("Could not open {}", file_path.display()))?;

    ron::from_str::<T>(&text)
        .map_err(anyhow::Error::from)
        .with_context(|| format!("Invalid syntax in {}", file_path.display()))
}

/// Serializes the given value of type `T` to RON and writes it to the given
/// path, creating any missing parent directories.
///
/// # Errors
/// Returns an error if serialization fails or the file can not be written.
pub fn write_ron_file<T>(value: &T, output_file_path: impl AsRef<Path>) -> Result<()>
where
    T: serde::ser::Serialize,
{
    let output_file_path = output_file_path.as_ref();
    let text = ron::ser::to_string_pretty(value, ron::ser::PrettyConfig::default())?;
    write_text_file(&text, output_file_path)
        .with_context(|| format!("Could not write {}", output_file_path.display()))
}

fn read_text_file(file_path: &Path) -> io::Result<String> {
    let file = File::open(file_path)?;
    let mut text = String::new();
    let _ = BufReader::new(file).read_to_string(&mut text)?;
    Ok(text)
}

fn write_text_file(text: &str, output_file_path: &Path) -> io::Result<()> {
    if let Some(parent) = output_file_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(output_file_path)?;
    write!(&mut file, "{text}")
}
