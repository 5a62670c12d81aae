use anyhow::Result;
use vergen::EmitBuilder;

fn main() -> Result<()> {
    // Git metadata for the CLI version string
    EmitBuilder::builder()
        .git_sha(true)
        .git_commit_date()
        .emit()?;
    Ok(())
}
