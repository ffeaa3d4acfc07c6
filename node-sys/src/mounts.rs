// SPDX-License-Identifier: GPL-3.0-only

//! Mount table and swap table parsing

use std::fs;
use std::path::Path;

use crate::{Result, SysError};

pub const MOUNTINFO: &str = "/proc/self/mountinfo";
pub const SWAPS: &str = "/proc/swaps";

/// One line of `/proc/self/mountinfo`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// `major:minor` of the backing device
    pub major_minor: String,
    /// Root of the mount within its filesystem (bind mounts of a file show
    /// the file's path here)
    pub root: String,
    pub mount_point: String,
    pub fs_type: String,
    pub source: String,
}

pub fn read_mountinfo(path: &Path) -> Result<Vec<MountEntry>> {
    let content = fs::read_to_string(path).map_err(|e| SysError::path_io(path, e))?;
    parse_mountinfo(&content)
}

pub fn parse_mountinfo(input: &str) -> Result<Vec<MountEntry>> {
    let mut entries = Vec::new();

    for line in input.lines().filter(|line| !line.trim().is_empty()) {
        let invalid = || SysError::InvalidMountInfoLine(line.to_string());
        let (left, right) = line.split_once(" - ").ok_or_else(invalid)?;

        let left_fields: Vec<&str> = left.split_whitespace().collect();
        if left_fields.len() < 5 {
            return Err(invalid());
        }

        let mut right_fields = right.split_whitespace();
        let fs_type = right_fields.next().ok_or_else(invalid)?;
        let source = right_fields.next().unwrap_or("none");

        entries.push(MountEntry {
            major_minor: left_fields[2].to_string(),
            root: unescape_mount_field(left_fields[3]),
            mount_point: unescape_mount_field(left_fields[4]),
            fs_type: fs_type.to_string(),
            source: unescape_mount_field(source),
        });
    }

    Ok(entries)
}

pub fn is_mount_point(entries: &[MountEntry], path: &str) -> bool {
    let path = path.trim_end_matches('/');
    let path = if path.is_empty() { "/" } else { path };
    entries.iter().any(|entry| entry.mount_point == path)
}

/// Active swap devices from `/proc/swaps`.
pub fn parse_swaps(input: &str) -> Vec<String> {
    input
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .map(unescape_mount_field)
        .collect()
}

fn unescape_mount_field(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let bytes = value.as_bytes();
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] == b'\\'
            && index + 3 < bytes.len()
            && bytes[index + 1..index + 4].iter().all(u8::is_ascii_digit)
        {
            if let Ok(num) = u8::from_str_radix(&value[index + 1..index + 4], 8) {
                output.push(num as char);
                index += 4;
                continue;
            }
        }

        output.push(bytes[index] as char);
        index += 1;
    }

    output
}
