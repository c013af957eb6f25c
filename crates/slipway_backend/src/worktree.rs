use anyhow::{Context as _, anyhow};
use slipway_domain::CreatedWorktree;
use std::ffi::OsStr;
use std::path::Path;
use std::process::Command;

const MAX_BRANCH_LEN: usize = 48;

pub(crate) fn run_git<I, S>(repo_path: &Path, args: I) -> anyhow::Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .output()
        .context("failed to spawn git")?;

    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!(
            "git failed ({}):\nstdout:\n{}\nstderr:\n{}",
            output.status,
            stdout.trim(),
            stderr.trim()
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
}

pub(crate) fn sanitize_branch_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut rest = trimmed;
    if let Some(stripped) = rest.strip_prefix("refs/heads/") {
        rest = stripped;
    }

    let mut out = String::new();
    let mut prev_hyphen = false;
    for ch in rest.chars() {
        let next = if ch.is_ascii_alphanumeric() {
            ch.to_ascii_lowercase()
        } else {
            '-'
        };
        if next == '-' {
            if prev_hyphen {
                continue;
            }
            prev_hyphen = true;
            out.push('-');
            continue;
        }
        prev_hyphen = false;
        out.push(next);
    }

    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        return None;
    }

    let limited = trimmed.chars().take(MAX_BRANCH_LEN).collect::<String>();
    let limited = limited.trim_matches('-').to_owned();
    if limited.is_empty() {
        return None;
    }
    Some(limited)
}

fn branch_exists(repo_path: &Path, branch_name: &str) -> bool {
    let branch_ref = format!("refs/heads/{branch_name}");
    Command::new("git")
        .args(["show-ref", "--verify", "--quiet", &branch_ref])
        .current_dir(repo_path)
        .status()
        .ok()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Creates a new worktree under `<repo>/worktrees/<branch>`. Collisions with
/// an existing branch or directory fall back to a `-v2`, `-v3`, ... suffix.
pub(crate) fn create_worktree(
    repo_path: &Path,
    requested_branch: &str,
) -> anyhow::Result<CreatedWorktree> {
    let slug = sanitize_branch_name(requested_branch)
        .ok_or_else(|| anyhow!("branch name has no usable characters: {requested_branch:?}"))?;

    let worktrees_root = repo_path.join("worktrees");
    std::fs::create_dir_all(&worktrees_root).context("failed to create worktrees root")?;

    for attempt in 0..64 {
        let branch_name = if attempt == 0 {
            slug.clone()
        } else {
            format!("{slug}-v{}", attempt + 1)
        };
        let worktree_path = worktrees_root.join(&branch_name);

        if worktree_path.exists() {
            continue;
        }
        if branch_exists(repo_path, &branch_name) {
            continue;
        }

        run_git(
            repo_path,
            [
                "worktree",
                "add",
                "-b",
                &branch_name,
                worktree_path
                    .to_str()
                    .ok_or_else(|| anyhow!("invalid worktree path"))?,
            ],
        )
        .with_context(|| format!("failed to create worktree at {}", worktree_path.display()))?;

        return Ok(CreatedWorktree {
            branch_name,
            worktree_path,
        });
    }

    Err(anyhow!(
        "failed to find a free branch name for {slug:?} after retries"
    ))
}
