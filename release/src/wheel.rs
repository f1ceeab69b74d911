//! Built wheels.

use anyhow::Error;
use derive_more::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The components of a wheel file name.
///
/// Wheel file names have the form `{distribution}-{version}(-{build})?-{python}-{abi}-{platform}.whl`.
/// Dashes within a component are escaped as underscores, so the name splits unambiguously.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WheelName {
    pub distribution: String,
    pub version: String,
    pub build: Option<String>,
    pub python: String,
    pub abi: String,
    pub platform: String,
}

impl WheelName {
    /// Parse the name of the wheel file at `path`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        path.file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| Error::msg(format!("{} is not a wheel file", path.display())))?
            .parse()
    }

    /// A requirement pinning this exact distribution and version.
    pub fn requirement(&self) -> Requirement {
        Requirement {
            name: self.distribution.clone(),
            version: self.version.clone(),
        }
    }
}

impl FromStr for WheelName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stem = s
            .strip_suffix(".whl")
            .ok_or_else(|| Error::msg(format!("{s} is not a wheel file")))?;
        let parts = stem.split('-').collect::<Vec<_>>();
        let (distribution, version, build, tags) = match parts.as_slice() {
            [distribution, version, tags @ ..] if tags.len() == 3 => {
                (distribution, version, None, tags)
            }
            [distribution, version, build, tags @ ..] if tags.len() == 3 => {
                (distribution, version, Some(build.to_string()), tags)
            }
            _ => {
                return Err(Error::msg(format!(
                    "malformed wheel name {s}: expected 5 or 6 components, found {}",
                    parts.len()
                )))
            }
        };

        if distribution.is_empty() || tags.iter().any(|tag| tag.is_empty()) {
            return Err(Error::msg(format!("malformed wheel name {s}: empty component")));
        }
        if !starts_with_digit(version) {
            return Err(Error::msg(format!(
                "malformed wheel name {s}: invalid version {version}"
            )));
        }
        if let Some(build) = &build {
            if !starts_with_digit(build) {
                return Err(Error::msg(format!(
                    "malformed wheel name {s}: invalid build tag {build}"
                )));
            }
        }

        Ok(Self {
            distribution: distribution.to_string(),
            version: version.to_string(),
            build,
            python: tags[0].to_string(),
            abi: tags[1].to_string(),
            platform: tags[2].to_string(),
        })
    }
}

fn starts_with_digit(s: &str) -> bool {
    s.chars().next().is_some_and(|c| c.is_ascii_digit())
}

/// A requirement on an exact version of a package, like `s3transfer==0.1.10`.
#[derive(Clone, Debug, Display, PartialEq, Eq)]
#[display(fmt = "{}=={}", name, version)]
pub struct Requirement {
    pub name: String,
    pub version: String,
}

/// Find the wheel in the directory `dist`.
///
/// If there is more than one, the first by file name is chosen.
pub fn find_wheel(dist: impl AsRef<Path>) -> Result<PathBuf, Error> {
    let dist = dist.as_ref();
    let mut wheels = dist
        .read_dir()
        .map_err(|err| Error::msg(format!("unable to read directory {}: {err}", dist.display())))?
        .filter_map(|dirent| match dirent {
            Ok(de) => Some(de.path()),
            Err(err) => {
                tracing::error!("unable to read directory {}: {err}", dist.display());
                None
            }
        })
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "whl"))
        .collect::<Vec<_>>();
    wheels.sort();
    if wheels.len() > 1 {
        tracing::warn!("found {} wheels in {}", wheels.len(), dist.display());
    }
    wheels
        .into_iter()
        .next()
        .ok_or_else(|| Error::msg(format!("no wheel found in {}", dist.display())))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse() {
        let name: WheelName = "s3transfer-0.1.10-py2.py3-none-any.whl".parse().unwrap();
        assert_eq!(
            name,
            WheelName {
                distribution: "s3transfer".into(),
                version: "0.1.10".into(),
                build: None,
                python: "py2.py3".into(),
                abi: "none".into(),
                platform: "any".into(),
            }
        );
        assert_eq!(name.requirement().to_string(), "s3transfer==0.1.10");
    }

    #[test]
    fn test_parse_build_tag() {
        let name: WheelName = "s3transfer_fork-1.2.0-1-py3-none-linux_x86_64.whl"
            .parse()
            .unwrap();
        assert_eq!(name.distribution, "s3transfer_fork");
        assert_eq!(name.build.as_deref(), Some("1"));
        assert_eq!(name.platform, "linux_x86_64");
    }

    #[test]
    fn test_parse_malformed() {
        for name in [
            "s3transfer-0.1.10.tar.gz",
            "s3transfer-0.1.10-py3.whl",
            "s3transfer-0.1.10-a-b-c-d-e.whl",
            "s3transfer-dev-py3-none-any.whl",
            "s3transfer-0.1-dev-py3-none-any.whl",
            "-0.1-py3-none-any.whl",
        ] {
            assert!(name.parse::<WheelName>().is_err(), "{name}");
        }
    }

    #[test]
    fn test_from_path() {
        let name = WheelName::from_path("/src/dist/pkg-1.0-py3-none-any.whl").unwrap();
        assert_eq!(name.requirement().to_string(), "pkg==1.0");
    }

    #[test]
    fn test_find_wheel() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("pkg-1.0.tar.gz"), "").unwrap();
        fs::write(dir.path().join("pkg-1.1-py3-none-any.whl"), "").unwrap();
        fs::write(dir.path().join("pkg-1.0-py3-none-any.whl"), "").unwrap();
        assert_eq!(
            find_wheel(dir.path()).unwrap(),
            dir.path().join("pkg-1.0-py3-none-any.whl")
        );
    }

    #[test]
    fn test_find_wheel_missing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("pkg-1.0.tar.gz"), "").unwrap();
        assert!(find_wheel(dir.path()).is_err());
        assert!(find_wheel(dir.path().join("dist")).is_err());
    }
}
