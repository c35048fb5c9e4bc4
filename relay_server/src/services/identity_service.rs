//! Repository identity resolution — which GitHub repository and commit a
//! build notification refers to.
//!
//! Two strategies exist and one is picked per deployment:
//!
//! - **Mirror lookup** asks Cloud Source Repositories for the mirror URL of the
//!   source repository and parses `https://<host>/<owner>/<repo>[.git]`.
//! - **Naming convention** parses the mirrored repository name, which Cloud
//!   Source Repositories spells `github-<owner>-<repo>` for GitHub mirrors.
//!
//! Both reject anything ambiguous instead of guessing.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::config::ResolverStrategy;
use crate::errors::{LookupError, ResolutionError};
use crate::models::notification::BuildNotification;
use crate::models::repo::RepoIdentity;

/// Prefix of mirrored repository names under the naming convention.
const MIRROR_NAME_PREFIX: &str = "github";

/// Looks up the externally hosted URL of a mirrored source repository.
#[async_trait]
pub trait MirrorRegistry: Send + Sync {
    async fn resolve_mirror_url(
        &self,
        project_id: &str,
        repo_name: &str,
    ) -> Result<String, LookupError>;
}

enum Strategy {
    MirrorLookup {
        registry: Arc<dyn MirrorRegistry>,
        host: String,
    },
    NamingConvention,
}

/// Resolves `RepoIdentity` values. Holds no per-message state; resolving the
/// same notification twice yields the same identity.
pub struct IdentityResolver {
    strategy: Strategy,
    allowed_owners: Vec<String>,
}

impl IdentityResolver {
    /// Resolve through the mirror registry, accepting only URLs on `host`.
    pub fn mirror_lookup(registry: Arc<dyn MirrorRegistry>, host: impl Into<String>) -> Self {
        Self {
            strategy: Strategy::MirrorLookup {
                registry,
                host: host.into().to_ascii_lowercase(),
            },
            allowed_owners: Vec::new(),
        }
    }

    /// Resolve from the `github-<owner>-<repo>` repository name.
    pub fn naming_convention() -> Self {
        Self {
            strategy: Strategy::NamingConvention,
            allowed_owners: Vec::new(),
        }
    }

    /// Build the resolver a deployment asked for.
    pub fn for_strategy(
        strategy: ResolverStrategy,
        registry: Arc<dyn MirrorRegistry>,
        host: impl Into<String>,
    ) -> Self {
        match strategy {
            ResolverStrategy::MirrorLookup => Self::mirror_lookup(registry, host),
            ResolverStrategy::NamingConvention => Self::naming_convention(),
        }
    }

    /// Restrict resolution to the given owners. An empty list allows any owner.
    pub fn with_allowed_owners(mut self, owners: Vec<String>) -> Self {
        self.allowed_owners = owners;
        self
    }

    pub fn strategy_name(&self) -> &'static str {
        match self.strategy {
            Strategy::MirrorLookup { .. } => "mirror-lookup",
            Strategy::NamingConvention => "naming-convention",
        }
    }

    pub async fn resolve(
        &self,
        notification: &BuildNotification,
    ) -> Result<RepoIdentity, ResolutionError> {
        let source = &notification.resolved_source;
        if source.commit_sha.is_empty() {
            return Err(ResolutionError::MissingCommit);
        }

        let (owner, repo) = match &self.strategy {
            Strategy::MirrorLookup { registry, host } => {
                let url = registry
                    .resolve_mirror_url(&source.source_project_id, &source.source_repo_name)
                    .await?;
                identity_from_url(&url, host)?
            }
            Strategy::NamingConvention => identity_from_repo_name(&source.source_repo_name)?,
        };

        if !self.owner_allowed(&owner) {
            return Err(ResolutionError::OwnerNotAllowed(owner));
        }

        Ok(RepoIdentity {
            owner,
            repo,
            commit_sha: source.commit_sha.clone(),
        })
    }

    fn owner_allowed(&self, owner: &str) -> bool {
        self.allowed_owners.is_empty()
            || self
                .allowed_owners
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(owner))
    }
}

/// Parse `(owner, repo)` out of a repository URL hosted on `host`.
pub fn identity_from_url(repo_url: &str, host: &str) -> Result<(String, String), ResolutionError> {
    let url = Url::parse(repo_url).map_err(|e| ResolutionError::InvalidUrl {
        url: repo_url.to_string(),
        reason: e.to_string(),
    })?;

    if !url
        .host_str()
        .is_some_and(|h| h.eq_ignore_ascii_case(host))
    {
        return Err(ResolutionError::UnknownHost {
            url: repo_url.to_string(),
            expected: host.to_string(),
        });
    }

    let malformed = || ResolutionError::MalformedPath {
        url: repo_url.to_string(),
    };

    let segments: Vec<&str> = url.path().split('/').collect();
    let [root, owner, repo] = segments[..] else {
        return Err(malformed());
    };
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    if !root.is_empty() || owner.is_empty() || repo.is_empty() {
        return Err(malformed());
    }

    Ok((owner.to_string(), repo.to_string()))
}

/// Parse `(owner, repo)` out of a `github-<owner>-<repo>` repository name.
pub fn identity_from_repo_name(name: &str) -> Result<(String, String), ResolutionError> {
    let fields: Vec<&str> = name.split('-').collect();
    if fields.len() < 3 {
        return Err(ResolutionError::MalformedName(name.to_string()));
    }
    if fields[0] != MIRROR_NAME_PREFIX {
        return Err(ResolutionError::UnknownRepoType {
            prefix: fields[0].to_string(),
            name: name.to_string(),
        });
    }

    let owner = fields[1];
    let repo = fields[2..].join("-");
    if owner.is_empty() || repo.is_empty() {
        return Err(ResolutionError::MalformedName(name.to_string()));
    }

    Ok((owner.to_string(), repo))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::models::notification::ResolvedRepoSource;
    use crate::models::status::BuildState;

    struct FakeRegistry {
        url: Result<String, String>,
        calls: AtomicUsize,
        seen: Mutex<Vec<(String, String)>>,
    }

    impl FakeRegistry {
        fn returning(url: &str) -> Arc<Self> {
            Arc::new(Self {
                url: Ok(url.to_string()),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                url: Err(message.to_string()),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl MirrorRegistry for FakeRegistry {
        async fn resolve_mirror_url(
            &self,
            project_id: &str,
            repo_name: &str,
        ) -> Result<String, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen
                .lock()
                .unwrap()
                .push((project_id.to_string(), repo_name.to_string()));
            self.url.clone().map_err(LookupError::Token)
        }
    }

    fn notification(repo_name: &str, sha: &str) -> BuildNotification {
        BuildNotification {
            id: "b1".to_string(),
            project_id: "builds".to_string(),
            log_url: "http://x/log".to_string(),
            status: BuildState::Success,
            resolved_source: ResolvedRepoSource {
                commit_sha: sha.to_string(),
                source_project_id: "source-project".to_string(),
                source_repo_name: repo_name.to_string(),
            },
        }
    }

    // ── Naming convention ──

    #[test]
    fn repo_name_with_dashes_in_repo() {
        let (owner, repo) = identity_from_repo_name("github-acme-my-repo").unwrap();
        assert_eq!(owner, "acme");
        assert_eq!(repo, "my-repo");
    }

    #[test]
    fn repo_name_simple() {
        let (owner, repo) = identity_from_repo_name("github-amcleodca-gcr-notifier").unwrap();
        assert_eq!(owner, "amcleodca");
        assert_eq!(repo, "gcr-notifier");
    }

    #[test]
    fn repo_name_too_few_segments() {
        assert!(matches!(
            identity_from_repo_name("github-acme"),
            Err(ResolutionError::MalformedName(_))
        ));
        assert!(matches!(
            identity_from_repo_name("bad"),
            Err(ResolutionError::MalformedName(_))
        ));
        assert!(matches!(
            identity_from_repo_name(""),
            Err(ResolutionError::MalformedName(_))
        ));
    }

    #[test]
    fn repo_name_wrong_prefix() {
        match identity_from_repo_name("gitlab-acme-repo") {
            Err(ResolutionError::UnknownRepoType { prefix, .. }) => assert_eq!(prefix, "gitlab"),
            other => panic!("expected UnknownRepoType, got {other:?}"),
        }
        assert!(identity_from_repo_name("GitHub-acme-repo").is_err());
    }

    #[test]
    fn repo_name_empty_segments() {
        assert!(matches!(
            identity_from_repo_name("github--repo"),
            Err(ResolutionError::MalformedName(_))
        ));
        assert!(matches!(
            identity_from_repo_name("github-acme-"),
            Err(ResolutionError::MalformedName(_))
        ));
    }

    // ── Mirror URL ──

    #[test]
    fn url_with_git_suffix() {
        let (owner, repo) =
            identity_from_url("https://github.com/acme/my-repo.git", "github.com").unwrap();
        assert_eq!(owner, "acme");
        assert_eq!(repo, "my-repo");
    }

    #[test]
    fn url_without_git_suffix() {
        let (owner, repo) = identity_from_url("https://github.com/acme/proj", "github.com").unwrap();
        assert_eq!((owner.as_str(), repo.as_str()), ("acme", "proj"));
    }

    #[test]
    fn url_on_other_host() {
        assert!(matches!(
            identity_from_url("https://example.com/acme/my-repo.git", "github.com"),
            Err(ResolutionError::UnknownHost { .. })
        ));
        assert!(matches!(
            identity_from_url("https://github.com.evil.io/acme/repo", "github.com"),
            Err(ResolutionError::UnknownHost { .. })
        ));
    }

    #[test]
    fn url_host_comparison_ignores_case() {
        assert!(identity_from_url("https://GitHub.com/acme/repo", "github.com").is_ok());
    }

    #[test]
    fn url_with_wrong_path_shape() {
        for url in [
            "https://github.com/acme",
            "https://github.com/",
            "https://github.com/acme/repo/",
            "https://github.com/acme/repo/tree/main",
            "https://github.com//repo",
            "https://github.com/acme/.git",
        ] {
            assert!(
                matches!(
                    identity_from_url(url, "github.com"),
                    Err(ResolutionError::MalformedPath { .. })
                ),
                "url {url}"
            );
        }
    }

    #[test]
    fn url_unparsable() {
        assert!(matches!(
            identity_from_url("git@github.com:acme/repo.git", "github.com"),
            Err(ResolutionError::InvalidUrl { .. })
        ));
        assert!(matches!(
            identity_from_url("", "github.com"),
            Err(ResolutionError::InvalidUrl { .. })
        ));
    }

    // ── Resolver ──

    #[tokio::test]
    async fn naming_convention_resolver() {
        let resolver = IdentityResolver::naming_convention();
        let identity = resolver
            .resolve(&notification("github-acme-proj", "abc123"))
            .await
            .unwrap();
        assert_eq!(
            identity,
            RepoIdentity {
                owner: "acme".to_string(),
                repo: "proj".to_string(),
                commit_sha: "abc123".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn mirror_lookup_resolver_queries_registry() {
        let registry = FakeRegistry::returning("https://github.com/acme/my-repo.git");
        let resolver = IdentityResolver::mirror_lookup(registry.clone(), "github.com");

        let identity = resolver
            .resolve(&notification("mirror-name", "abc123"))
            .await
            .unwrap();
        assert_eq!(identity.owner, "acme");
        assert_eq!(identity.repo, "my-repo");
        assert_eq!(identity.commit_sha, "abc123");
        assert_eq!(
            registry.seen.lock().unwrap().as_slice(),
            &[("source-project".to_string(), "mirror-name".to_string())]
        );
    }

    #[tokio::test]
    async fn mirror_lookup_failure_is_resolution_error() {
        let resolver =
            IdentityResolver::mirror_lookup(FakeRegistry::failing("denied"), "github.com");
        let err = resolver
            .resolve(&notification("mirror-name", "abc123"))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::Lookup(_)));
    }

    #[tokio::test]
    async fn mirror_lookup_rejects_foreign_host() {
        let registry = FakeRegistry::returning("https://source.developers.google.com/p/x/r/y");
        let resolver = IdentityResolver::mirror_lookup(registry, "github.com");
        let err = resolver
            .resolve(&notification("y", "abc123"))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::UnknownHost { .. }));
    }

    #[tokio::test]
    async fn missing_commit_skips_lookup() {
        let registry = FakeRegistry::returning("https://github.com/acme/proj");
        let resolver = IdentityResolver::mirror_lookup(registry.clone(), "github.com");
        let err = resolver
            .resolve(&notification("github-acme-proj", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::MissingCommit));
        assert_eq!(registry.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disallowed_owner_is_resolution_error() {
        let resolver = IdentityResolver::naming_convention()
            .with_allowed_owners(vec!["amcleodca".to_string()]);

        let err = resolver
            .resolve(&notification("github-acme-proj", "abc123"))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::OwnerNotAllowed(owner) if owner == "acme"));

        let identity = resolver
            .resolve(&notification("github-AMcleodCA-proj", "abc123"))
            .await
            .unwrap();
        assert_eq!(identity.owner, "AMcleodCA");
    }

    #[tokio::test]
    async fn resolving_twice_is_idempotent() {
        let registry = FakeRegistry::returning("https://github.com/acme/proj.git");
        let resolver = IdentityResolver::mirror_lookup(registry.clone(), "github.com");
        let n = notification("proj", "abc123");

        let first = resolver.resolve(&n).await.unwrap();
        let second = resolver.resolve(&n).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn strategy_selection() {
        let registry = FakeRegistry::returning("https://github.com/a/b");
        let resolver = IdentityResolver::for_strategy(
            ResolverStrategy::NamingConvention,
            registry.clone(),
            "github.com",
        );
        assert_eq!(resolver.strategy_name(), "naming-convention");
        let resolver =
            IdentityResolver::for_strategy(ResolverStrategy::MirrorLookup, registry, "github.com");
        assert_eq!(resolver.strategy_name(), "mirror-lookup");
    }
}
