use crate::platform::types;

/// Map an octocrab pull request to our platform type.
pub fn map_pull_request(pr: octocrab::models::pulls::PullRequest) -> types::PullRequest {
    types::PullRequest {
        id: pr.id.into_inner(),
        number: pr.number,
        html_url: pr.html_url.map(|u| u.to_string()).unwrap_or_default(),
        head_ref: pr.head.ref_field.clone(),
        head_repo_full_name: pr.head.repo.as_ref().and_then(|r| r.full_name.clone()),
        base_ref: pr.base.ref_field.clone(),
    }
}
