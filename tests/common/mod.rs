//! Fake external tools for integration tests
#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// spotdl stand-in: writes `<output>/<TRACK_NAME>` unless the URL contains "missing"
pub const TRACK_NAME: &str = "Test Artist - Test Song.mp3";

const FAKE_SPOTDL: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "4.2.0"
  exit 0
fi
case "$2" in
  *missing*)
    echo "No results found for $2" >&2
    exit 1
    ;;
esac
echo "Processing query: $2"
echo "Downloaded \"Test Artist - Test Song\""
printf 'ID3' > "$8/Test Artist - Test Song.mp3"
exit 0
"#;

/// ffmpeg stand-in: copies input to output, fails on inputs named "corrupt*"
const FAKE_FFMPEG: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then
  echo "ffmpeg version 6.0"
  exit 0
fi
case "$3" in
  *corrupt*)
    echo "$3: Invalid data found when processing input" >&2
    exit 1
    ;;
esac
cp "$3" "$5"
"#;

/// ffmpeg stand-in that never finishes on its own
const SLOW_FFMPEG: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then
  exit 0
fi
sleep 30
cp "$3" "$5"
"#;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    {
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file.sync_all().unwrap();
    }
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub fn fake_spotdl(dir: &Path) -> PathBuf {
    write_script(dir, "spotdl", FAKE_SPOTDL)
}

pub fn fake_ffmpeg(dir: &Path) -> PathBuf {
    write_script(dir, "ffmpeg", FAKE_FFMPEG)
}

pub fn slow_ffmpeg(dir: &Path) -> PathBuf {
    write_script(dir, "ffmpeg", SLOW_FFMPEG)
}

pub fn touch(path: &Path) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, b"audio").unwrap();
    path.to_path_buf()
}
