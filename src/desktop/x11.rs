use anyhow::{bail, Context, Result};
use std::{collections::HashSet, process::Command};

use super::{WindowQuery, FALLBACK_SCREEN};
use crate::models::{WindowGeometry, WindowInfo};

/// X11 window queries through `xdotool`.
pub struct XdotoolWindows {
    bin: String,
}

impl XdotoolWindows {
    pub fn new() -> Self {
        Self {
            bin: "xdotool".to_string(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let out = Command::new(&self.bin)
            .args(args)
            .output()
            .with_context(|| format!("Failed to run {} {}", self.bin, args.join(" ")))?;
        if !out.status.success() {
            // `search` exits 1 when nothing matches
            if out.stdout.is_empty() && out.stderr.is_empty() {
                return Ok(String::new());
            }
            bail!(
                "{} {} exited with {}: {}",
                self.bin,
                args.join(" "),
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }

    fn search(&self, pattern: &str) -> Result<Vec<String>> {
        let out = self.run(&["search", "--onlyvisible", "--name", pattern])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn name_of(&self, id: &str) -> Option<String> {
        self.run(&["getwindowname", id])
            .ok()
            .map(|name| name.trim().to_string())
    }

    fn geometry_of(&self, id: &str) -> Option<WindowGeometry> {
        let out = self.run(&["getwindowgeometry", "--shell", id]).ok()?;
        parse_shell_geometry(&out)
    }

    /// Window id whose title is exactly `title`, else the first partial match.
    fn find(&self, title: &str) -> Option<String> {
        let ids = self.search(&regex_escape(title)).ok()?;
        ids.iter()
            .find(|id| self.name_of(id).as_deref() == Some(title))
            .or_else(|| ids.first())
            .cloned()
    }
}

impl Default for XdotoolWindows {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowQuery for XdotoolWindows {
    fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        let mut seen = HashSet::new();
        let mut windows = Vec::new();
        for id in self.search(".")? {
            let Some(title) = self.name_of(&id).filter(|t| !t.is_empty()) else {
                continue;
            };
            if !seen.insert(title.clone()) {
                continue;
            }
            let geometry = self.geometry_of(&id);
            windows.push(WindowInfo { title, geometry });
        }
        windows.sort_by_key(|w| w.title.to_lowercase());
        Ok(windows)
    }

    fn window_geometry(&self, title: &str) -> Option<WindowGeometry> {
        let id = self.find(title)?;
        self.geometry_of(&id).filter(|g| !g.is_empty())
    }

    fn focus_window(&self, title: &str) -> bool {
        let Some(id) = self.find(title) else {
            return false;
        };
        match self.run(&["windowactivate", "--sync", &id]) {
            Ok(_) => true,
            Err(err) => {
                log::warn!("Could not focus '{title}': {err:#}");
                false
            }
        }
    }

    fn screen_size(&self) -> (u32, u32) {
        self.run(&["getdisplaygeometry"])
            .ok()
            .and_then(|out| parse_display_geometry(&out))
            .unwrap_or(FALLBACK_SCREEN)
    }
}

/// Parse `getwindowgeometry --shell` output (`X=..`, `Y=..`, `WIDTH=..`,
/// `HEIGHT=..` lines).
pub fn parse_shell_geometry(output: &str) -> Option<WindowGeometry> {
    let (mut x, mut y, mut w, mut h) = (None, None, None, None);
    for line in output.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        match key {
            "X" => x = value.parse::<i32>().ok(),
            "Y" => y = value.parse::<i32>().ok(),
            "WIDTH" => w = value.parse::<u32>().ok(),
            "HEIGHT" => h = value.parse::<u32>().ok(),
            _ => {}
        }
    }
    Some(WindowGeometry::new(x?, y?, w?, h?))
}

/// Parse `getdisplaygeometry` output, e.g. `1920 1080`.
pub fn parse_display_geometry(output: &str) -> Option<(u32, u32)> {
    let mut parts = output.split_whitespace();
    let width = parts.next()?.parse().ok()?;
    let height = parts.next()?.parse().ok()?;
    Some((width, height))
}

fn regex_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
