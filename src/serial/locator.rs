/// Resolves the device's serial path from an ordered list of glob patterns
/// (`/dev/ttyACM*`, `/dev/ttyUSB[0-9]`, `/dev/serial/by-id/*`).
///
/// The first pattern with any match wins, and within it the
/// lexicographically smallest path is returned.
#[derive(Debug, Clone)]
pub struct PortLocator {
    patterns: Vec<String>,
}

impl PortLocator {
    pub fn new(patterns: Vec<String>) -> Self {
        Self { patterns }
    }

    pub fn find_port(&self) -> Option<String> {
        self.patterns.iter().find_map(|pattern| {
            let mut matches = expand(pattern);
            matches.sort();
            matches.into_iter().next()
        })
    }
}

fn expand(pattern: &str) -> Vec<String> {
    let paths = match glob::glob(pattern) {
        Ok(paths) => paths,
        Err(e) => {
            log::warn!("Ignoring invalid port pattern '{}': {}", pattern, e);
            return Vec::new();
        }
    };

    paths
        .filter_map(|entry| match entry {
            Ok(path) => Some(path.to_string_lossy().into_owned()),
            Err(e) => {
                log::debug!("Skipping unreadable path while matching '{}': {}", pattern, e);
                None
            }
        })
        .collect()
}
