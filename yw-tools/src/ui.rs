use std::{io::{stdin, stdout, BufRead, Write}, path::Path};

use tracing::{debug, info};


/// What a conversion asks and tells the user.
pub trait Ui {
    /// Whether an existing output file may be overwritten.
    fn confirm_overwrite(&mut self, path: &Path) -> bool;
    /// What is being converted.
    fn set_info_what(&mut self, message: &str);
    /// How the conversion went.
    fn set_info_how(&mut self, message: &str);
}

/// Never asks, only logs.
#[derive(Debug, Default)]
pub struct SilentUi;

impl Ui for SilentUi {
    fn confirm_overwrite(&mut self, _path: &Path) -> bool {
        true
    }

    fn set_info_what(&mut self, message: &str) {
        debug!("{message}");
    }

    fn set_info_how(&mut self, message: &str) {
        debug!("{message}");
    }
}

/// Asks on the terminal.
#[derive(Debug, Default)]
pub struct ConsoleUi {
    pub assume_yes: bool,
}

impl Ui for ConsoleUi {
    fn confirm_overwrite(&mut self, path: &Path) -> bool {
        if self.assume_yes {
            return true;
        }
        print!("Overwrite existing file \"{}\"? (y/n) ", path.display());
        if stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        if stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
    }

    fn set_info_what(&mut self, message: &str) {
        info!("{message}");
    }

    fn set_info_how(&mut self, message: &str) {
        info!("{message}");
    }
}
