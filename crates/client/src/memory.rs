//! In-process control plane implementing [`ScalrApi`].
//!
//! Applies the same remote-side defaults the real service does (generated ids,
//! `status`, `created_by`, `queue_all_runs`), records every call and supports
//! one-shot fault injection per operation.

use std::sync::{Mutex, MutexGuard};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::models::*;
use crate::{ClientError, ClientResult, ScalrApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    ReadEnvironment,
    CreateEnvironment,
    UpdateEnvironment,
    DeleteEnvironment,
    AddEnvironmentTags,
    DeleteEnvironmentTags,
    ReadServiceAccount,
    ListServiceAccounts,
    CreateServiceAccount,
    UpdateServiceAccount,
    DeleteServiceAccount,
    ReadTeam,
    UpdateTeam,
    ReadWorkspace,
    CreateWorkspace,
    UpdateWorkspace,
    DeleteWorkspace,
}

/// Serializable snapshot of the control plane.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub principal: Option<CreatedBy>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub teams: Vec<Team>,
    #[serde(default)]
    pub environments: Vec<Environment>,
    #[serde(default)]
    pub service_accounts: Vec<ServiceAccount>,
    #[serde(default)]
    pub workspaces: Vec<Workspace>,
}

#[derive(Default)]
struct Inner {
    principal: CreatedBy,
    users: FxHashMap<String, User>,
    teams: FxHashMap<String, Team>,
    environments: FxHashMap<String, Environment>,
    service_accounts: FxHashMap<String, ServiceAccount>,
    workspaces: FxHashMap<String, Workspace>,
    faults: FxHashMap<Op, ClientError>,
    calls: Vec<Op>,
}

impl Inner {
    /// Record the call and surface an injected fault, if any.
    fn enter(&mut self, op: Op) -> ClientResult<()> {
        self.calls.push(op);
        match self.faults.remove(&op) {
            Some(err) => {
                debug!(?op, error = %err, "injected fault");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn environment_mut(&mut self, id: &str) -> ClientResult<&mut Environment> {
        self.environments.get_mut(id).ok_or_else(|| ClientError::not_found("environment", id))
    }

    fn created_by(&self) -> Option<CreatedBy> {
        Some(self.principal.clone())
    }
}

fn new_id(prefix: &str) -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &raw[..16])
}

fn sorted<T: Clone>(map: &FxHashMap<String, T>) -> Vec<T> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    keys.into_iter().filter_map(|k| map.get(k).cloned()).collect()
}

fn dedup_push(list: &mut Vec<Relation>, items: Vec<Relation>) {
    for item in items {
        if !list.contains(&item) {
            list.push(item);
        }
    }
}

pub struct MemoryClient {
    inner: Mutex<Inner>,
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryClient {
    pub fn new() -> Self {
        let principal = CreatedBy {
            username: "provider".into(),
            email: "provider@scalr.local".into(),
            full_name: "Provider Automation".into(),
        };
        Self { inner: Mutex::new(Inner { principal, ..Inner::default() }) }
    }

    pub fn from_fixture(fixture: Fixture) -> Self {
        let me = Self::new();
        if let Ok(mut s) = me.inner.lock() {
            if let Some(p) = fixture.principal {
                s.principal = p;
            }
            s.users = fixture.users.into_iter().map(|u| (u.id.clone(), u)).collect();
            s.teams = fixture.teams.into_iter().map(|t| (t.id.clone(), t)).collect();
            s.environments = fixture.environments.into_iter().map(|e| (e.id.clone(), e)).collect();
            s.service_accounts = fixture.service_accounts.into_iter().map(|a| (a.id.clone(), a)).collect();
            s.workspaces = fixture.workspaces.into_iter().map(|w| (w.id.clone(), w)).collect();
        }
        me
    }

    fn state(&self) -> ClientResult<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| ClientError::Unavailable("memory control plane lock poisoned".into()))
    }

    /// Snapshot with every collection sorted by id.
    pub fn fixture(&self) -> ClientResult<Fixture> {
        let s = self.state()?;
        Ok(Fixture {
            principal: Some(s.principal.clone()),
            users: sorted(&s.users),
            teams: sorted(&s.teams),
            environments: sorted(&s.environments),
            service_accounts: sorted(&s.service_accounts),
            workspaces: sorted(&s.workspaces),
        })
    }

    pub fn insert_user(&self, user: User) -> ClientResult<()> {
        self.state()?.users.insert(user.id.clone(), user);
        Ok(())
    }

    pub fn insert_team(&self, team: Team) -> ClientResult<()> {
        self.state()?.teams.insert(team.id.clone(), team);
        Ok(())
    }

    pub fn insert_environment(&self, env: Environment) -> ClientResult<()> {
        self.state()?.environments.insert(env.id.clone(), env);
        Ok(())
    }

    pub fn insert_service_account(&self, sa: ServiceAccount) -> ClientResult<()> {
        self.state()?.service_accounts.insert(sa.id.clone(), sa);
        Ok(())
    }

    pub fn insert_workspace(&self, ws: Workspace) -> ClientResult<()> {
        self.state()?.workspaces.insert(ws.id.clone(), ws);
        Ok(())
    }

    /// Out-of-band removal, as if another writer deleted the object.
    pub fn remove_environment(&self, id: &str) -> ClientResult<Option<Environment>> {
        Ok(self.state()?.environments.remove(id))
    }

    pub fn remove_workspace(&self, id: &str) -> ClientResult<Option<Workspace>> {
        Ok(self.state()?.workspaces.remove(id))
    }

    pub fn remove_team(&self, id: &str) -> ClientResult<Option<Team>> {
        Ok(self.state()?.teams.remove(id))
    }

    pub fn team(&self, id: &str) -> Option<Team> {
        self.state().ok()?.teams.get(id).cloned()
    }

    pub fn environment(&self, id: &str) -> Option<Environment> {
        self.state().ok()?.environments.get(id).cloned()
    }

    pub fn workspace(&self, id: &str) -> Option<Workspace> {
        self.state().ok()?.workspaces.get(id).cloned()
    }

    /// Make the next call of `op` fail with `err`.
    pub fn fail_next(&self, op: Op, err: ClientError) -> ClientResult<()> {
        self.state()?.faults.insert(op, err);
        Ok(())
    }

    pub fn calls(&self) -> Vec<Op> {
        self.state().map(|s| s.calls.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, op: Op) -> usize {
        self.calls().into_iter().filter(|c| *c == op).count()
    }

    pub fn clear_calls(&self) {
        if let Ok(mut s) = self.state() {
            s.calls.clear();
        }
    }
}

#[async_trait::async_trait]
impl ScalrApi for MemoryClient {
    async fn read_environment(&self, id: &str) -> ClientResult<Environment> {
        let mut s = self.state()?;
        s.enter(Op::ReadEnvironment)?;
        s.environments.get(id).cloned().ok_or_else(|| ClientError::not_found("environment", id))
    }

    async fn create_environment(&self, opts: EnvironmentCreateOptions) -> ClientResult<Environment> {
        let mut s = self.state()?;
        s.enter(Op::CreateEnvironment)?;
        if opts.name.is_empty() {
            return Err(ClientError::unprocessable("environment name is required"));
        }
        if opts.account.id.is_empty() {
            return Err(ClientError::unprocessable("account is required"));
        }
        let mut tags = Vec::new();
        dedup_push(&mut tags, opts.tags.unwrap_or_default());
        let env = Environment {
            id: new_id("env"),
            name: opts.name,
            status: "Active".into(),
            cost_estimation_enabled: opts.cost_estimation_enabled.unwrap_or(false),
            account: opts.account,
            created_by: s.created_by(),
            cloud_credentials: opts.cloud_credentials,
            policy_groups: opts.policy_groups,
            default_provider_configurations: opts.default_provider_configurations.unwrap_or_default(),
            tags,
        };
        s.environments.insert(env.id.clone(), env.clone());
        Ok(env)
    }

    async fn update_environment(&self, id: &str, opts: EnvironmentUpdateOptions) -> ClientResult<Environment> {
        let mut s = self.state()?;
        s.enter(Op::UpdateEnvironment)?;
        let env = s.environment_mut(id)?;
        if let Some(name) = opts.name {
            env.name = name;
        }
        if let Some(enabled) = opts.cost_estimation_enabled {
            env.cost_estimation_enabled = enabled;
        }
        env.cloud_credentials = opts.cloud_credentials;
        env.policy_groups = opts.policy_groups;
        env.default_provider_configurations = opts.default_provider_configurations;
        Ok(env.clone())
    }

    async fn delete_environment(&self, id: &str) -> ClientResult<()> {
        let mut s = self.state()?;
        s.enter(Op::DeleteEnvironment)?;
        s.environments.remove(id).map(|_| ()).ok_or_else(|| ClientError::not_found("environment", id))
    }

    async fn add_environment_tags(&self, environment_id: &str, tags: Vec<Relation>) -> ClientResult<()> {
        let mut s = self.state()?;
        s.enter(Op::AddEnvironmentTags)?;
        let env = s.environment_mut(environment_id)?;
        dedup_push(&mut env.tags, tags);
        Ok(())
    }

    async fn delete_environment_tags(&self, environment_id: &str, tags: Vec<Relation>) -> ClientResult<()> {
        let mut s = self.state()?;
        s.enter(Op::DeleteEnvironmentTags)?;
        let env = s.environment_mut(environment_id)?;
        env.tags.retain(|t| !tags.contains(t));
        Ok(())
    }

    async fn read_service_account(&self, id: &str) -> ClientResult<ServiceAccount> {
        let mut s = self.state()?;
        s.enter(Op::ReadServiceAccount)?;
        s.service_accounts.get(id).cloned().ok_or_else(|| ClientError::not_found("service account", id))
    }

    async fn list_service_accounts(&self, opts: ServiceAccountListOptions) -> ClientResult<ListPage<ServiceAccount>> {
        let mut s = self.state()?;
        s.enter(Op::ListServiceAccounts)?;
        let items: Vec<ServiceAccount> = sorted(&s.service_accounts)
            .into_iter()
            .filter(|sa| opts.email.as_deref().map_or(true, |e| sa.email == e))
            .filter(|sa| opts.account.as_deref().map_or(true, |a| sa.account.id == a))
            .collect();
        let total_count = items.len();
        Ok(ListPage { items, total_count })
    }

    async fn create_service_account(&self, opts: ServiceAccountCreateOptions) -> ClientResult<ServiceAccount> {
        let mut s = self.state()?;
        s.enter(Op::CreateServiceAccount)?;
        if opts.name.is_empty() {
            return Err(ClientError::unprocessable("service account name is required"));
        }
        if s.service_accounts.values().any(|sa| sa.name == opts.name && sa.account == opts.account) {
            return Err(ClientError::Api { status: 409, message: format!("service account {} already exists", opts.name) });
        }
        let sa = ServiceAccount {
            id: new_id("sa"),
            email: format!("{}@{}.scalr.io", opts.name, opts.account.id),
            name: opts.name,
            description: opts.description.unwrap_or_default(),
            status: opts.status.unwrap_or_default(),
            account: opts.account,
            created_by: s.created_by(),
        };
        s.service_accounts.insert(sa.id.clone(), sa.clone());
        Ok(sa)
    }

    async fn update_service_account(&self, id: &str, opts: ServiceAccountUpdateOptions) -> ClientResult<ServiceAccount> {
        let mut s = self.state()?;
        s.enter(Op::UpdateServiceAccount)?;
        let sa = s.service_accounts.get_mut(id).ok_or_else(|| ClientError::not_found("service account", id))?;
        if let Some(name) = opts.name {
            sa.name = name;
        }
        if let Some(description) = opts.description {
            sa.description = description;
        }
        if let Some(status) = opts.status {
            sa.status = status;
        }
        Ok(sa.clone())
    }

    async fn delete_service_account(&self, id: &str) -> ClientResult<()> {
        let mut s = self.state()?;
        s.enter(Op::DeleteServiceAccount)?;
        s.service_accounts.remove(id).map(|_| ()).ok_or_else(|| ClientError::not_found("service account", id))
    }

    async fn read_team(&self, id: &str) -> ClientResult<Team> {
        let mut s = self.state()?;
        s.enter(Op::ReadTeam)?;
        s.teams.get(id).cloned().ok_or_else(|| ClientError::not_found("team", id))
    }

    async fn update_team(&self, id: &str, opts: TeamUpdateOptions) -> ClientResult<Team> {
        let mut s = self.state()?;
        s.enter(Op::UpdateTeam)?;
        if let Some(unknown) = opts.users.iter().find(|u| !s.users.contains_key(&u.id)) {
            return Err(ClientError::unprocessable(format!("user {} not found", unknown.id)));
        }
        let team = s.teams.get_mut(id).ok_or_else(|| ClientError::not_found("team", id))?;
        team.users.clear();
        dedup_push(&mut team.users, opts.users);
        Ok(team.clone())
    }

    async fn read_workspace(&self, id: &str) -> ClientResult<Workspace> {
        let mut s = self.state()?;
        s.enter(Op::ReadWorkspace)?;
        s.workspaces.get(id).cloned().ok_or_else(|| ClientError::not_found("workspace", id))
    }

    async fn create_workspace(&self, opts: WorkspaceCreateOptions) -> ClientResult<Workspace> {
        let mut s = self.state()?;
        s.enter(Op::CreateWorkspace)?;
        if opts.name.is_empty() {
            return Err(ClientError::unprocessable("workspace name is required"));
        }
        if !s.environments.contains_key(&opts.environment.id) {
            return Err(ClientError::unprocessable(format!("environment {} not found", opts.environment.id)));
        }
        let id = opts.id.unwrap_or_else(|| new_id("ws"));
        if s.workspaces.contains_key(&id) {
            return Err(ClientError::Api { status: 409, message: format!("workspace {} already exists", id) });
        }
        let ws = Workspace {
            id,
            name: opts.name,
            environment: opts.environment,
            auto_apply: opts.auto_apply.unwrap_or(false),
            execution_mode: opts.execution_mode.unwrap_or_default(),
            queue_all_runs: opts.queue_all_runs.unwrap_or(true),
            terraform_version: opts.terraform_version.unwrap_or_else(|| "1.5.7".into()),
            working_directory: opts.working_directory.unwrap_or_default(),
            vcs_provider: opts.vcs_provider,
            vcs_repo: opts.vcs_repo,
            created_by: s.created_by(),
        };
        s.workspaces.insert(ws.id.clone(), ws.clone());
        Ok(ws)
    }

    async fn update_workspace(&self, id: &str, opts: WorkspaceUpdateOptions) -> ClientResult<Workspace> {
        let mut s = self.state()?;
        s.enter(Op::UpdateWorkspace)?;
        let ws = s.workspaces.get_mut(id).ok_or_else(|| ClientError::not_found("workspace", id))?;
        if let Some(name) = opts.name {
            ws.name = name;
        }
        if let Some(v) = opts.auto_apply {
            ws.auto_apply = v;
        }
        if let Some(v) = opts.execution_mode {
            ws.execution_mode = v;
        }
        if let Some(v) = opts.queue_all_runs {
            ws.queue_all_runs = v;
        }
        if let Some(v) = opts.terraform_version {
            ws.terraform_version = v;
        }
        if let Some(v) = opts.working_directory {
            ws.working_directory = v;
        }
        ws.vcs_provider = opts.vcs_provider;
        ws.vcs_repo = opts.vcs_repo;
        Ok(ws.clone())
    }

    async fn delete_workspace(&self, id: &str) -> ClientResult<()> {
        let mut s = self.state()?;
        s.enter(Op::DeleteWorkspace)?;
        s.workspaces.remove(id).map(|_| ()).ok_or_else(|| ClientError::not_found("workspace", id))
    }
}
