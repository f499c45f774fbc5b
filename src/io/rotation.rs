use std::path::Path;

use log::info;

use crate::error::BlazeLogError;

/// Size-based log file rotation. Used only by the worker thread.
///
/// Tracks bytes written to the active file; when the threshold is crossed
/// the file is renamed to `<base><k><ext>` for the least positive `k` whose
/// target does not exist, and the caller reopens the original path.
pub struct FileRotator {
    base: String,
    extension: String,
    max_size_bytes: u64,
    current_size: u64,
}

impl FileRotator {
    pub fn new(file_name: &str, max_size_bytes: u64) -> Self {
        let (base, extension) = split_base_and_extension(file_name);
        FileRotator {
            base,
            extension,
            max_size_bytes,
            current_size: 0,
        }
    }

    /// A threshold of zero rotates on every write.
    pub fn should_rotate(&self) -> bool {
        self.current_size >= self.max_size_bytes
    }

    pub fn update_current_size(&mut self, bytes_written: u64) {
        self.current_size += bytes_written;
    }

    pub fn current_size(&self) -> u64 {
        self.current_size
    }

    pub fn current_file_name(&self) -> String {
        format!("{}{}", self.base, self.extension)
    }

    /// Rename the active file to the next free rotated name and reset the
    /// byte counter. Rotating a non-existent file is a no-op that still
    /// resets the counter. Returns the rotated-to name, if any.
    #[tracing::instrument(level = "info", skip(self), fields(file = %self.current_file_name()))]
    pub fn rotate(&mut self) -> Result<Option<String>, BlazeLogError> {
        let current = self.current_file_name();

        let rotated = if Path::new(&current).exists() {
            let target = self.next_rotated_name();
            std::fs::rename(&current, &target).map_err(|e| {
                BlazeLogError::rotation_failed(e, &format!("renaming {current} to {target}"))
            })?;
            info!("rotated {current} to {target}");
            Some(target)
        } else {
            None
        };

        self.current_size = 0;
        Ok(rotated)
    }

    pub fn reset(&mut self) {
        self.current_size = 0;
    }

    fn next_rotated_name(&self) -> String {
        let mut counter = 1u32;
        loop {
            let candidate = format!("{}{}{}", self.base, counter, self.extension);
            if !Path::new(&candidate).exists() {
                return candidate;
            }
            counter += 1;
        }
    }
}

/// The extension is the longest suffix starting with `.` that contains no
/// separator and does not start the file name itself, so `.hidden.log`
/// splits into `.hidden` + `.log` and `.hidden` keeps no extension.
fn split_base_and_extension(file_name: &str) -> (String, String) {
    if let Some(dot_pos) = file_name.rfind('.') {
        let suffix = &file_name[dot_pos..];
        let starts_file_name =
            dot_pos == 0 || file_name.as_bytes()[dot_pos - 1] == b'/';
        if !suffix.contains('/') && !starts_file_name {
            return (
                file_name[..dot_pos].to_string(),
                suffix.to_string(),
            );
        }
    }
    (file_name.to_string(), String::new())
}
