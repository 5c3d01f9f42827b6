//! Firmware image loading.
//!
//! Resolves the file actually uploaded: a sibling `<image>.signed` wins over
//! the plain image, and ELF images are converted to raw binaries with an
//! external objcopy before reading.

use crate::error::{OtaError, Result};
use crate::ota::Reporter;
use bytes::Bytes;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Default converter for ELF images
pub const DEFAULT_OBJCOPY: &str = "arm-none-eabi-objcopy";

/// An image ready for upload.
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    /// File the bytes were read from
    pub path: PathBuf,
    pub data: Bytes,
}

impl FirmwareImage {
    /// Path as text, the form the authentication nonce is built from
    pub fn path_str(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Locate, convert if needed, and read the image at `path`.
pub async fn prepare(path: &Path, objcopy: &str, reporter: &dyn Reporter) -> Result<FirmwareImage> {
    if !path.exists() {
        return Err(OtaError::FileNotFound(path.to_path_buf()));
    }

    let mut path = path.to_path_buf();

    let signed = signed_path(&path);
    if signed.exists() {
        reporter.signed_image(&signed);
        tracing::info!("Using signed image {}", signed.display());
        path = signed;
    }

    if is_elf(&path) {
        reporter.converting_elf(&path);
        path = convert_elf(&path, objcopy).await?;
    }

    let data = Bytes::from(tokio::fs::read(&path).await?);
    tracing::debug!("Loaded {} ({} bytes)", path.display(), data.len());

    Ok(FirmwareImage { path, data })
}

/// `<path>.signed`
fn signed_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".signed");
    PathBuf::from(name)
}

fn is_elf(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "elf")
}

/// Run `<objcopy> -O binary <path> <path.bin>` and return the output path.
async fn convert_elf(path: &Path, objcopy: &str) -> Result<PathBuf> {
    let output = path.with_extension("bin");

    let status = Command::new(objcopy)
        .arg("-O")
        .arg("binary")
        .arg(path)
        .arg(&output)
        .stdin(Stdio::null())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|e| OtaError::ImageConversion {
            path: path.to_path_buf(),
            reason: format!("failed to run {}: {}", objcopy, e),
        })?;

    if !status.success() {
        return Err(OtaError::ImageConversion {
            path: path.to_path_buf(),
            reason: format!("{} exited with {}", objcopy, status),
        });
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ota::Silent;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Notices(Mutex<Vec<String>>);

    impl Reporter for Notices {
        fn signed_image(&self, path: &Path) {
            self.0.lock().unwrap().push(format!("signed {}", path.display()));
        }

        fn converting_elf(&self, path: &Path) {
            self.0.lock().unwrap().push(format!("elf {}", path.display()));
        }
    }

    #[tokio::test]
    async fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.bin");

        let err = prepare(&missing, DEFAULT_OBJCOPY, &Silent).await.unwrap_err();
        assert!(matches!(err, OtaError::FileNotFound(p) if p == missing));
    }

    #[tokio::test]
    async fn test_plain_image() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("fw.bin");
        fs::write(&path, b"abc")?;

        let image = prepare(&path, DEFAULT_OBJCOPY, &Silent).await?;

        assert_eq!(image.path, path);
        assert_eq!(&image.data[..], b"abc");
        Ok(())
    }

    #[tokio::test]
    async fn test_signed_image_preferred() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("fw.bin");
        fs::write(&path, b"plain")?;
        fs::write(temp.path().join("fw.bin.signed"), b"signed")?;

        let notices = Notices::default();
        let image = prepare(&path, DEFAULT_OBJCOPY, &notices).await?;

        assert_eq!(image.path, temp.path().join("fw.bin.signed"));
        assert_eq!(&image.data[..], b"signed");
        assert_eq!(notices.0.lock().unwrap().len(), 1);
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_elf_conversion_uses_objcopy() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new()?;
        let elf = temp.path().join("fw.elf");
        fs::write(&elf, b"\x7fELF")?;

        // Stand-in objcopy: copies its 3rd argument to its 4th
        let tool = temp.path().join("fake-objcopy");
        fs::write(&tool, "#!/bin/sh\ncp \"$3\" \"$4\"\n")?;
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755))?;

        let notices = Notices::default();
        let image = prepare(&elf, tool.to_str().unwrap(), &notices).await?;

        assert_eq!(image.path, temp.path().join("fw.bin"));
        assert_eq!(&image.data[..], b"\x7fELF");
        assert!(notices.0.lock().unwrap()[0].starts_with("elf "));
        Ok(())
    }

    #[tokio::test]
    async fn test_elf_conversion_failure() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let elf = temp.path().join("fw.elf");
        fs::write(&elf, b"\x7fELF")?;

        let err = prepare(&elf, "/nonexistent/objcopy", &Silent)
            .await
            .unwrap_err();
        assert!(matches!(err, OtaError::ImageConversion { .. }));
        Ok(())
    }

    #[test]
    fn test_signed_path() {
        assert_eq!(
            signed_path(Path::new("dir/fw.bin")),
            PathBuf::from("dir/fw.bin.signed")
        );
        assert!(is_elf(Path::new("fw.elf")));
        assert!(!is_elf(Path::new("fw.bin")));
    }
}
