use super::*;
use std::io::Write;

// Every line starts with the logger label and the wall-clock time, so logs
// of several sessions can be interleaved and still told apart.
fn write_line_prefix(w: &mut dyn Write, label: &str) {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|dur| dur.as_secs_f64())
        .unwrap_or(0.);
    let _ = write!(w, "{} at {:.6} ", label, secs);
}

impl FileLogger {
    pub fn new<S: ToString>(label: S, file: std::fs::File) -> Self {
        Self(label.to_string(), file)
    }

    /// Appends to the log file at `path`, creating it if needed.
    pub fn create<S: ToString, P: AsRef<std::path::Path>>(label: S, path: P) -> CoreResult<Self> {
        let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(label, file))
    }
}

impl VecLogger {
    pub fn new<S: ToString>(label: S) -> Self {
        Self(label.to_string(), Vec::new())
    }

    /// Everything logged so far, lossily decoded.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.1).into_owned()
    }
}

impl Logger for DummyLogger {
    fn line_writer(&mut self) -> Option<&mut dyn Write> {
        None
    }
}

impl Logger for VecLogger {
    fn line_writer(&mut self) -> Option<&mut dyn Write> {
        write_line_prefix(&mut self.1, &self.0);
        Some(&mut self.1)
    }
    fn dump_log(&self, w: &mut dyn Write) {
        let _ = w.write_all(&self.1);
    }
}

impl Logger for FileLogger {
    fn line_writer(&mut self) -> Option<&mut dyn Write> {
        write_line_prefix(&mut self.1, &self.0);
        Some(&mut self.1)
    }
}

impl Drop for VecLogger {
    fn drop(&mut self) {
        // a failing test shows what the core did before it failed
        if !std::thread::panicking() || self.1.is_empty() {
            return;
        }
        let stderr = std::io::stderr();
        let mut lock = stderr.lock();
        let _ = writeln!(lock, "--- {} log ---", self.0);
        self.dump_log(&mut lock);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(feature = "no_logging"))]
    fn vec_logger_prefixes_lines() {
        let mut logger = VecLogger::new("session-a");
        log!(logger, "alloc {}", 3);
        log!(logger, "release {}", 3);
        let contents = logger.contents();
        let lines = contents.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("session-a at "));
        assert!(lines[0].ends_with(" alloc 3"));
        assert!(lines[1].ends_with(" release 3"));

        let mut dumped = Vec::new();
        logger.dump_log(&mut dumped);
        assert_eq!(dumped, contents.into_bytes());
    }

    #[test]
    #[cfg(not(feature = "no_logging"))]
    fn file_logger_appends() {
        let path = std::env::temp_dir().join(format!("arraycore_rs-log-{}.txt", std::process::id()));
        let _ = std::fs::remove_file(&path);
        {
            let mut logger = FileLogger::create("first", &path).unwrap();
            log!(logger, "opened");
        }
        let mut logger = FileLogger::create("second", &path).unwrap();
        log!(logger, "reopened");
        drop(logger);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines = contents.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("first at ") && lines[0].ends_with(" opened"));
        assert!(lines[1].starts_with("second at ") && lines[1].ends_with(" reopened"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn file_logger_reports_open_failures() {
        let path = std::env::temp_dir().join("arraycore_rs-missing-dir").join("log.txt");
        assert!(matches!(
            FileLogger::create("x", &path),
            Err(CoreError::IoFailure { kind: std::io::ErrorKind::NotFound, .. })
        ));
    }

    #[test]
    fn dummy_logger_writes_nothing() {
        let mut logger = DummyLogger;
        assert!(logger.line_writer().is_none());
        log!(logger, "ignored");
    }
}
