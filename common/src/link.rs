//! Link replacement with platform fallbacks.
//!
//! [`update_link`] is the single primitive used to repoint the `current`
//! version pointer and the launcher entry. It always tries a native symbolic
//! link first. Only when that fails (for example on Windows without
//! developer mode) does it fall back to a directory junction for directories
//! or a hard link for files. Callers never branch on platform.

use log::debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// What the link points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// The target is a directory.
    Directory,
    /// The target is a regular file.
    File,
}

/// How the link was materialised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMethod {
    /// A native symbolic link.
    Symlink,
    /// A Windows directory junction.
    Junction,
    /// A hard link to the target file.
    HardLink,
}

/// Point `link` at `target`, replacing whatever link was there before.
///
/// On Unix the new symlink is created under a random sibling name and
/// renamed over `link`, so observers see either the old or the new target
/// and concurrent callers never share a staging name.
///
/// # Errors
///
/// Returns an I/O error when neither a symlink nor the fallback could be
/// created, or when `link` names a real directory.
pub fn update_link(target: &Path, link: &Path, kind: LinkKind) -> io::Result<LinkMethod> {
    let parent = match link.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let name = link
        .file_name()
        .map_or_else(|| "link".to_owned(), |n| n.to_string_lossy().into_owned());
    let staged = tempfile::Builder::new()
        .prefix(&format!(".{name}."))
        .suffix(".tmp")
        .make_in(parent, |path| create_symlink(target, path, kind));

    match staged {
        Ok(staged) => {
            replace_with(staged, link)?;
            Ok(LinkMethod::Symlink)
        }
        Err(symlink_err) => {
            debug!(
                "symlink {} -> {} failed ({symlink_err}); trying fallback",
                link.display(),
                target.display()
            );
            create_fallback(target, link, kind, symlink_err)
        }
    }
}

/// Remove a link, junction, or plain file at `link`.
///
/// Returns `false` when nothing existed. Real directories are refused so a
/// misconfigured pointer path can never delete an installed version.
///
/// # Errors
///
/// Returns an I/O error when removal fails or `link` is a real directory.
pub fn remove_link(link: &Path) -> io::Result<bool> {
    let metadata = match fs::symlink_metadata(link) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };

    let file_type = metadata.file_type();
    if file_type.is_symlink() {
        remove_symlink(link)?;
        return Ok(true);
    }
    if file_type.is_dir() {
        #[cfg(windows)]
        {
            // Junctions surface as directories; remove_dir only detaches them
            // and refuses non-empty real directories.
            fs::remove_dir(link)?;
            return Ok(true);
        }
        #[cfg(not(windows))]
        {
            return Err(io::Error::other(format!(
                "{} is a directory, not a link",
                link.display()
            )));
        }
    }
    fs::remove_file(link)?;
    Ok(true)
}

/// Read where `link` points. `None` when the link does not exist.
///
/// # Errors
///
/// Returns an I/O error when `link` exists but is not a link.
pub fn read_link_target(link: &Path) -> io::Result<Option<PathBuf>> {
    match fs::read_link(link) {
        Ok(target) => Ok(Some(target)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Rename the staged link over `link`. A failed rename drops the staged
/// link.
fn replace_with(staged: NamedTempFile<()>, link: &Path) -> io::Result<()> {
    #[cfg(windows)]
    {
        // Windows cannot rename over an existing link.
        remove_link(link)?;
    }
    staged.persist(link).map_err(|err| err.error)
}

fn create_fallback(
    target: &Path,
    link: &Path,
    kind: LinkKind,
    symlink_err: io::Error,
) -> io::Result<LinkMethod> {
    match kind {
        LinkKind::Directory => {
            if !cfg!(windows) {
                return Err(symlink_err);
            }
            remove_link(link)?;
            create_junction(target, link)?;
            Ok(LinkMethod::Junction)
        }
        LinkKind::File => {
            remove_link(link)?;
            fs::hard_link(target, link)?;
            Ok(LinkMethod::HardLink)
        }
    }
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path, _kind: LinkKind) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_symlink(target: &Path, link: &Path, kind: LinkKind) -> io::Result<()> {
    match kind {
        LinkKind::Directory => std::os::windows::fs::symlink_dir(target, link),
        LinkKind::File => std::os::windows::fs::symlink_file(target, link),
    }
}

#[cfg(not(any(unix, windows)))]
fn create_symlink(_target: &Path, _link: &Path, _kind: LinkKind) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symbolic links are not supported on this platform",
    ))
}

#[cfg(windows)]
fn remove_symlink(link: &Path) -> io::Result<()> {
    // Directory symlinks need remove_dir on Windows.
    fs::remove_dir(link).or_else(|_| fs::remove_file(link))
}

#[cfg(not(windows))]
fn remove_symlink(link: &Path) -> io::Result<()> {
    fs::remove_file(link)
}

#[cfg(windows)]
fn create_junction(target: &Path, link: &Path) -> io::Result<()> {
    let output = std::process::Command::new("cmd")
        .arg("/C")
        .arg("mklink")
        .arg("/J")
        .arg(link)
        .arg(target)
        .output()?;
    if output.status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!(
            "mklink /J failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

#[cfg(not(windows))]
fn create_junction(_target: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "directory junctions are only available on Windows",
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn creates_symlink_to_directory() {
        let temp = tempfile::tempdir().expect("temp dir");
        let target = temp.path().join("v0.10.0");
        fs::create_dir(&target).expect("target");
        let link = temp.path().join("current");

        let method = update_link(&target, &link, LinkKind::Directory).expect("link");

        assert_eq!(method, LinkMethod::Symlink);
        assert_eq!(read_link_target(&link).expect("read"), Some(target));
    }

    #[test]
    fn replaces_existing_link() {
        let temp = tempfile::tempdir().expect("temp dir");
        let old = temp.path().join("stable");
        let new = temp.path().join("nightly");
        fs::create_dir(&old).expect("old");
        fs::create_dir(&new).expect("new");
        let link = temp.path().join("current");

        update_link(&old, &link, LinkKind::Directory).expect("first");
        update_link(&new, &link, LinkKind::Directory).expect("second");

        assert_eq!(read_link_target(&link).expect("read"), Some(new));
        let staged: Vec<_> = fs::read_dir(temp.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(staged.is_empty());
    }

    #[test]
    fn concurrent_updates_of_one_link_all_succeed() {
        let temp = tempfile::tempdir().expect("temp dir");
        let targets: Vec<PathBuf> = (0..8)
            .map(|n| {
                let target = temp.path().join(format!("v0.{n}.0"));
                fs::create_dir(&target).expect("target");
                target
            })
            .collect();
        let link = temp.path().join("current");

        std::thread::scope(|scope| {
            let handles: Vec<_> = targets
                .iter()
                .map(|target| {
                    let link = &link;
                    scope.spawn(move || update_link(target, link, LinkKind::Directory))
                })
                .collect();
            for handle in handles {
                let method = handle.join().expect("link thread").expect("update link");
                assert_eq!(method, LinkMethod::Symlink);
            }
        });

        let resolved = read_link_target(&link).expect("read").expect("link exists");
        assert!(targets.contains(&resolved));
        let staged: Vec<_> = fs::read_dir(temp.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(staged.is_empty());
    }

    #[test]
    fn file_link_points_at_binary() {
        let temp = tempfile::tempdir().expect("temp dir");
        let binary = temp.path().join("nvim");
        fs::write(&binary, b"#!/bin/sh\n").expect("binary");
        let launcher = temp.path().join("bin").join("nvim");

        update_link(&binary, &launcher, LinkKind::File).expect("link");

        assert_eq!(fs::read(&launcher).expect("read"), b"#!/bin/sh\n");
    }

    #[rstest]
    #[case::missing(false)]
    #[case::present(true)]
    fn remove_link_reports_whether_anything_was_removed(#[case] present: bool) {
        let temp = tempfile::tempdir().expect("temp dir");
        let link = temp.path().join("current");
        if present {
            std::os::unix::fs::symlink(temp.path(), &link).expect("seed link");
        }

        assert_eq!(remove_link(&link).expect("remove"), present);
        assert!(fs::symlink_metadata(&link).is_err());
    }

    #[test]
    fn remove_link_refuses_real_directories() {
        let temp = tempfile::tempdir().expect("temp dir");
        let dir = temp.path().join("v0.9.5");
        fs::create_dir(&dir).expect("dir");

        assert!(remove_link(&dir).is_err());
        assert!(dir.is_dir());
    }

    #[test]
    fn read_link_target_is_none_when_absent() {
        let temp = tempfile::tempdir().expect("temp dir");
        assert_eq!(
            read_link_target(&temp.path().join("current")).expect("read"),
            None
        );
    }
}
