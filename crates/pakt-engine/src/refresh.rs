//! Repository refresh.
//!
//! Enumerates the enabled remote repositories, decides which are stale,
//! downloads metadata per repo with staged progress and rebuilds the
//! solver sack. A repo that fails to fetch is reported and skipped; one
//! bad mirror never aborts the batch, and signature prompts surface as
//! values rather than unwinding through the loop.

use std::fs;
use std::sync::Arc;

use pakt_backend::Job;
use pakt_state::State;
use pakt_types::{Bitfield, PkError, Status};
use tracing::{debug, warn};

use crate::context::EngineContext;
use crate::error::{JobFailure, OpResult};
use crate::providers::{RefreshError, RepoInfo, RepoKind, UpdateFlags};

/// Refreshes every enabled repo, honoring `force`.
pub fn refresh_cache(
    ctx: &EngineContext,
    job: &Arc<Job>,
    state: &mut State,
    force: bool,
) -> OpResult<()> {
    state.set_steps(&[1, 95, 4])?;
    state.set_action(Status::RefreshCache, None);

    let repos = ctx.providers.repos.repos()?;
    let candidates: Vec<&RepoInfo> = repos
        .iter()
        .filter(|r| r.enabled && r.kind == RepoKind::Remote)
        .collect();

    // figure out which repos actually need refreshing
    let mut stale: Vec<&RepoInfo> = Vec::new();
    {
        let mut check_state = state.child()?;
        if candidates.is_empty() {
            check_state.finished()?;
        } else {
            check_state.set_number_steps(candidates.len())?;
            for repo in &candidates {
                let fresh = ctx.providers.repos.check(&repo.id, job.cache_age());
                if !fresh || force {
                    stale.push(*repo);
                }
                check_state.step_done()?;
            }
        }
    }
    state.step_done()?;

    // everything up to date already
    if stale.is_empty() {
        state.finished()?;
        return Ok(());
    }

    {
        let mut download_state = state.child()?;
        download_state.set_number_steps(stale.len())?;
        for repo in &stale {
            if force {
                debug!(repo = %repo.id, "cleaning repo contents as refresh was forced");
                ctx.providers.repos.clean(&repo.id)?;
            }
            let mut repo_state = download_state.child()?;
            refresh_repo(ctx, job, &mut repo_state, repo)?;
            download_state.step_done()?;
        }
    }
    state.step_done()?;

    // rebuild the solver metadata
    {
        let mut rebuild_state = state.child()?;
        ctx.sack_cache.invalidate("repository metadata changed");
        ctx.sack_cache.get_or_build(
            &ctx.providers,
            job,
            Bitfield::none(),
            false,
            &mut rebuild_state,
        )?;
    }
    state.step_done()?;
    Ok(())
}

/// Refreshes one repo: check, download, install AppStream payloads.
///
/// `CannotFetchSource` is downgraded to a message; signature prompts
/// consult the imported-key registry and fall back to the prompt event.
fn refresh_repo(
    ctx: &EngineContext,
    job: &Arc<Job>,
    state: &mut State,
    repo: &RepoInfo,
) -> OpResult<()> {
    state.set_steps(&[2, 98])?;
    state.set_action(Status::DownloadRepository, Some(&repo.id));
    state.step_done()?;

    let mut update_state = state.child()?;
    match ctx
        .providers
        .repos
        .update(&repo.id, UpdateFlags::default(), &mut update_state)
    {
        Ok(()) => {}
        Err(RefreshError::CannotFetchSource(message)) => {
            warn!(repo = %repo.id, message, "skipping refresh");
            job.message(format!("Skipping refresh of {}: {}", repo.id, message));
            update_state.finished()?;
            state.finished()?;
            return Ok(());
        }
        Err(RefreshError::SignatureRequired(signature)) => {
            if ctx.signatures.is_approved(&signature.key_id) {
                debug!(repo = %repo.id, key = %signature.key_id, "auto-approving imported key");
                ctx.providers.repos.import_key(&signature)?;
                let mut retry_state = state.child()?;
                ctx.providers
                    .repos
                    .update(
                        &repo.id,
                        UpdateFlags {
                            import_pubkey: true,
                        },
                        &mut retry_state,
                    )
                    .map_err(|err| {
                        JobFailure::new(PkError::GpgFailure, err.to_string())
                    })?;
            } else {
                job.repo_signature_required(*signature);
                job.message(format!(
                    "Repository {} requires a signature decision; skipped",
                    repo.id
                ));
                update_state.finished()?;
                state.finished()?;
                return Ok(());
            }
        }
        Err(RefreshError::Other(message)) => {
            return Err(JobFailure::new(PkError::RepoNotAvailable, message));
        }
    }

    install_appstream(ctx, &repo.id);
    state.step_done()?;
    Ok(())
}

/// Copies AppStream payloads into the shared cache directory. Failures
/// are warnings; the metadata itself already refreshed.
fn install_appstream(ctx: &EngineContext, repo_id: &str) {
    let payloads = ctx.providers.repos.appstream_payloads(repo_id);
    if payloads.is_empty() {
        return;
    }
    let cache_dir = pakt_utils::path::appstream_dir(&ctx.dest_dir);
    if let Err(err) = fs::create_dir_all(&cache_dir) {
        warn!(%err, "cannot create appstream cache dir");
        return;
    }
    for payload in payloads {
        let Some(file_name) = payload.file_name() else {
            continue;
        };
        if let Err(err) = fs::copy(&payload, cache_dir.join(file_name)) {
            warn!(repo = repo_id, %err, "failed to install appstream payload");
        }
    }
}
