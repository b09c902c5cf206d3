//! Reading the set of deployed image references.

use crate::cli::DeployedArgs;
use anyhow::{bail, Context, Result};
use regsweep_registry::ImageRef;
use std::path::Path;

/// Parse a deployed-images listing: one reference per line, blank lines and
/// `#` comments ignored. `origin` names the source in error messages.
pub fn parse_deployed(contents: &str, origin: &str) -> Result<Vec<ImageRef>> {
    let mut images = Vec::new();
    for (number, line) in contents.lines().enumerate() {
        let line = match line.split_once('#') {
            Some((before, _)) => before,
            None => line,
        }
        .trim();
        if line.is_empty() {
            continue;
        }
        let image = ImageRef::parse(line)
            .with_context(|| format!("{}:{}: invalid image reference '{}'", origin, number + 1, line))?;
        images.push(image);
    }
    Ok(images)
}

pub fn read_deployed_file(path: &Path) -> Result<Vec<ImageRef>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read deployed images from {}", path.display()))?;
    parse_deployed(&contents, &path.display().to_string())
}

/// Every deployed reference named by `--deployed` files and `--image` flags.
pub fn collect_deployed(args: &DeployedArgs) -> Result<Vec<ImageRef>> {
    if args.files.is_empty() && args.images.is_empty() {
        bail!("No deployed images given; pass --deployed FILE or --image REF");
    }

    let mut images = Vec::new();
    for file in &args.files {
        images.extend(read_deployed_file(file)?);
    }
    for raw in &args.images {
        let image = ImageRef::parse(raw.trim())
            .with_context(|| format!("Invalid image reference '{}'", raw))?;
        images.push(image);
    }
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_comments_and_blank_lines_are_ignored() {
        let contents = "\
# production
registry.example.com/team/app:1.4.2

registry.example.com/web:2024-05-01   # pinned
   # indented comment
";
        let images = parse_deployed(contents, "prod.txt").expect("should parse");
        let refs: Vec<_> = images.iter().map(|i| i.reference()).collect();
        assert_eq!(
            refs,
            vec![
                "registry.example.com/team/app:1.4.2",
                "registry.example.com/web:2024-05-01"
            ]
        );
    }

    #[test]
    fn test_missing_tag_means_latest() {
        let images = parse_deployed("registry.example.com/app\n", "x").expect("should parse");
        assert!(images[0].is_latest());
    }

    #[test]
    fn test_collect_requires_a_source() {
        assert!(collect_deployed(&DeployedArgs::default()).is_err());
    }

    #[test]
    fn test_collect_merges_files_and_flags() {
        let mut file = tempfile::NamedTempFile::new().expect("should create temp file");
        writeln!(file, "registry.example.com/app:1.0.0").expect("should write");
        let args = DeployedArgs {
            files: vec![file.path().to_path_buf()],
            images: vec!["registry.example.com/web:3".into()],
        };
        let images = collect_deployed(&args).expect("should collect");
        assert_eq!(images.len(), 2);
        assert_eq!(images[1].repository, "web");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let args = DeployedArgs {
            files: vec!["/nonexistent/regsweep/deployed.txt".into()],
            images: Vec::new(),
        };
        let err = collect_deployed(&args).expect_err("missing file should fail");
        assert!(err.to_string().contains("Failed to read deployed images"));
    }
}
