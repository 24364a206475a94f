use crate::error::GitError;
use crate::types::Commit;
use git2::{DiffFindOptions, DiffOptions, ErrorCode, ObjectType, Oid, Repository, Sort, TreeWalkMode, TreeWalkResult};
use std::path::{Path, PathBuf};

/// One blob in a commit's tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub blob: Oid,
}

/// One changed path between two trees, as reported by the repository layer
#[derive(Debug, Clone)]
pub struct TreeChange {
    pub status: git2::Delta,
    pub old_path: Option<String>,
    pub new_path: Option<String>,
    pub old_blob: Option<Oid>,
    pub new_blob: Option<Oid>,
}

impl TreeChange {
    /// New path, or the old path when the file no longer exists
    pub fn path(&self) -> &str {
        self.new_path
            .as_deref()
            .or(self.old_path.as_deref())
            .unwrap_or_default()
    }
}

/// Repository access used by the walker and the diff extractor
pub struct GitRepo {
    repo: Repository,
    repo_path: PathBuf,
}

impl GitRepo {
    /// Discover and open a git repository from any path within it
    pub fn discover<P: AsRef<Path>>(path: P) -> Result<Self, GitError> {
        let path = path.as_ref();

        let repo = Repository::discover(path).map_err(|e| GitError::OpenFailed {
            path: path.display().to_string(),
            reason: e.message().to_string(),
        })?;

        let repo_path = repo
            .workdir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| repo.path().to_path_buf());

        tracing::info!("Opened git repository at: {}", repo_path.display());

        Ok(Self { repo, repo_path })
    }

    /// Repository root (work tree, or the git directory for bare repositories)
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn raw(&self) -> &Repository {
        &self.repo
    }

    /// Name of the checked-out branch
    pub fn current_branch(&self) -> Result<String, GitError> {
        let head = self.repo.head().map_err(|e| match e.code() {
            ErrorCode::UnbornBranch | ErrorCode::NotFound => GitError::DetachedHead,
            _ => GitError::from(e),
        })?;
        if !head.is_branch() {
            return Err(GitError::DetachedHead);
        }
        head.shorthand()
            .map(|s| s.to_string())
            .ok_or(GitError::DetachedHead)
    }

    /// Tip commit of a local branch
    pub fn branch_tip(&self, branch: &str) -> Result<Oid, GitError> {
        let reference = self
            .repo
            .find_branch(branch, git2::BranchType::Local)
            .map_err(|_| GitError::BranchNotFound(branch.to_string()))?;
        let commit = reference
            .get()
            .peel_to_commit()
            .map_err(|_| GitError::BranchNotFound(branch.to_string()))?;
        Ok(commit.id())
    }

    /// Resolve a short or full reference to a canonical commit identity
    pub fn resolve(&self, reference: &str) -> Result<Oid, GitError> {
        let object = self.repo.revparse_single(reference).map_err(|e| match e.code() {
            ErrorCode::Ambiguous => GitError::AmbiguousReference(reference.to_string()),
            ErrorCode::NotFound | ErrorCode::InvalidSpec => {
                GitError::UnknownReference(reference.to_string())
            }
            _ => GitError::from(e),
        })?;
        let commit = object
            .peel_to_commit()
            .map_err(|_| GitError::UnknownReference(reference.to_string()))?;
        Ok(commit.id())
    }

    /// Like [`resolve`](Self::resolve), reporting a missing reference as an unknown commit
    pub fn resolve_commit(&self, reference: &str) -> Result<Oid, GitError> {
        self.resolve(reference).map_err(|e| match e {
            GitError::UnknownReference(r) => GitError::UnknownCommit(r),
            other => other,
        })
    }

    /// Build the commit record for `oid` as extracted for `branch`
    pub fn commit_record(&self, oid: Oid, branch: &str) -> Result<Commit, GitError> {
        let commit = self
            .repo
            .find_commit(oid)
            .map_err(|_| GitError::UnknownCommit(oid.to_string()))?;
        let author = commit.author();
        let committer = commit.committer();

        Ok(Commit {
            hash: oid.to_string(),
            branch: branch.to_string(),
            message: String::from_utf8_lossy(commit.message_bytes()).into_owned(),
            author_name: author.name().unwrap_or("Unknown").to_string(),
            author_email: author.email().unwrap_or("").to_string(),
            author_time: author.when().seconds(),
            committer_name: committer.name().unwrap_or("Unknown").to_string(),
            committer_email: committer.email().unwrap_or("").to_string(),
            commit_time: commit.time().seconds(),
            parent_hashes: commit.parent_ids().map(|p| p.to_string()).collect(),
        })
    }

    /// First parent of a commit, if any
    pub fn first_parent(&self, oid: Oid) -> Result<Option<Oid>, GitError> {
        let commit = self.repo.find_commit(oid)?;
        Ok(commit.parent_ids().next())
    }

    /// Whether `ancestor` is `descendant` or reachable from it
    pub fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> Result<bool, GitError> {
        if ancestor == descendant {
            return Ok(true);
        }
        Ok(self.repo.graph_descendant_of(descendant, ancestor)?)
    }

    /// Fail unless `commit` is reachable from the tip of `branch`
    pub fn ensure_on_branch(&self, commit: Oid, branch: &str) -> Result<(), GitError> {
        let tip = self.branch_tip(branch)?;
        if self.is_ancestor(commit, tip)? {
            Ok(())
        } else {
            Err(GitError::CommitNotOnBranch {
                commit: commit.to_string(),
                branch: branch.to_string(),
            })
        }
    }

    /// Commits after `boundary` (exclusive) up to `end` (inclusive), oldest first
    ///
    /// Every commit reachable from `end` is listed, including commits brought
    /// in by merges, not only the first-parent chain.
    pub fn commits_between(&self, boundary: Option<Oid>, end: Oid) -> Result<Vec<Oid>, GitError> {
        if let Some(boundary) = boundary
            && !self.is_ancestor(boundary, end)?
        {
            return Err(GitError::InvalidResumeBoundary {
                boundary: boundary.to_string(),
                end: end.to_string(),
            });
        }

        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME | Sort::REVERSE)?;
        revwalk.push(end)?;
        if let Some(boundary) = boundary {
            revwalk.hide(boundary)?;
        }

        let commits = revwalk.collect::<Result<Vec<_>, _>>()?;
        tracing::debug!("Enumerated {} commits up to {}", commits.len(), end);
        Ok(commits)
    }

    /// Every blob in the commit's tree, in tree order
    ///
    /// Submodule entries are skipped since they carry no blob.
    pub fn tree_entries(&self, oid: Oid) -> Result<Vec<TreeEntry>, GitError> {
        let tree = self.repo.find_commit(oid)?.tree()?;
        let mut entries = Vec::new();

        tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(ObjectType::Blob)
                && let Some(name) = entry.name()
            {
                entries.push(TreeEntry {
                    path: format!("{}{}", root, name),
                    blob: entry.id(),
                });
            }
            TreeWalkResult::Ok
        })?;

        Ok(entries)
    }

    /// Changed paths between two commits with rename and copy detection
    ///
    /// `old = None` compares against the empty tree, so every file is added.
    pub fn changes(&self, old: Option<Oid>, new: Oid) -> Result<Vec<TreeChange>, GitError> {
        let new_tree = self.repo.find_commit(new)?.tree()?;
        let old_tree = match old {
            Some(oid) => Some(self.repo.find_commit(oid)?.tree()?),
            None => None,
        };

        let mut diff_opts = DiffOptions::new();
        diff_opts.ignore_submodules(true);
        let mut diff =
            self.repo
                .diff_tree_to_tree(old_tree.as_ref(), Some(&new_tree), Some(&mut diff_opts))?;

        let mut find_opts = DiffFindOptions::new();
        find_opts.renames(true).copies(true);
        diff.find_similar(Some(&mut find_opts))?;

        let side = |file: git2::DiffFile<'_>| -> (Option<String>, Option<Oid>) {
            let path = file.path().map(|p| p.to_string_lossy().replace('\\', "/"));
            let blob = (!file.id().is_zero() && file.mode() != git2::FileMode::Commit)
                .then(|| file.id());
            (path, blob)
        };

        let changes = diff
            .deltas()
            .map(|delta| {
                let (old_path, old_blob) = side(delta.old_file());
                let (new_path, new_blob) = side(delta.new_file());
                let status = delta.status();
                TreeChange {
                    status,
                    old_path: old_blob.and(old_path),
                    new_path: match status {
                        git2::Delta::Deleted => None,
                        _ => new_path,
                    },
                    old_blob,
                    new_blob,
                }
            })
            .filter(|change| change.old_blob.is_some() || change.new_blob.is_some())
            .collect();

        Ok(changes)
    }
}
