//! Store en mémoire: tests et `STORE_BACKEND=memory`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{
    DataProvider, DataProviderTaskRecord, ExpiringRun, ExportConfig, ExportFormat, ExportRun, Job, JobDetail,
    RunFootprint, RunStatus, Tag, User,
};
use crate::infrastructure::database::{JobStore, JobTransaction, ProviderStore, RunStore};
use crate::utils::error::{AppError, Result};

/// Point de panne injectable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    InsertJob,
    AttachFormats,
    InsertTag,
    AttachConfig,
    AttachProviders,
    Commit,
    DeleteRun(Uuid),
    MarkNotified(Uuid),
    RecentRuns(Uuid),
}

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    formats: Vec<ExportFormat>,
    configs: HashMap<Uuid, ExportConfig>,
    providers: Vec<DataProvider>,
    jobs: HashMap<Uuid, Job>,
    job_formats: HashMap<Uuid, Vec<String>>,
    job_configs: HashMap<Uuid, Vec<(i32, Uuid)>>,
    job_providers: HashMap<Uuid, Vec<Uuid>>,
    tags: Vec<Tag>,
    runs: Vec<ExportRun>,
    task_records: Vec<DataProviderTaskRecord>,
    fail_points: HashSet<FailPoint>,
}

impl State {
    fn check(&self, point: FailPoint) -> Result<()> {
        if self.fail_points.contains(&point) {
            return Err(AppError::Database(format!("injected failure at {:?}", point)));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pré-rempli avec les formats et le fournisseur OSM usuels
    pub async fn with_reference_data() -> Self {
        let store = Self::new();
        for (slug, name) in [
            ("shp", "ESRI Shapefile Format"),
            ("gpkg", "Geopackage"),
            ("kml", "KML Format"),
            ("sqlite", "SQLITE Format"),
            ("gpx", "GPX Format"),
        ] {
            store
                .add_format(ExportFormat {
                    slug: slug.to_string(),
                    name: name.to_string(),
                    description: name.to_string(),
                })
                .await;
        }
        store.add_provider(DataProvider::new("OpenStreetMap Data", "osm")).await;
        store
    }

    pub async fn fail_at(&self, point: FailPoint) {
        self.state.lock().await.fail_points.insert(point);
    }

    pub async fn add_user(&self, user: User) {
        self.state.lock().await.users.insert(user.id, user);
    }

    pub async fn add_format(&self, format: ExportFormat) {
        self.state.lock().await.formats.push(format);
    }

    pub async fn add_config(&self, config: ExportConfig) {
        self.state.lock().await.configs.insert(config.uid, config);
    }

    pub async fn add_provider(&self, provider: DataProvider) {
        self.state.lock().await.providers.push(provider);
    }

    /// Insère directement un job lié à des fournisseurs
    pub async fn add_job(&self, job: Job, provider_uids: Vec<Uuid>) {
        let mut state = self.state.lock().await;
        state.job_providers.insert(job.uid, provider_uids);
        state.jobs.insert(job.uid, job);
    }

    pub async fn add_run(&self, run: ExportRun) {
        self.state.lock().await.runs.push(run);
    }

    pub async fn add_task_record(&self, record: DataProviderTaskRecord) {
        self.state.lock().await.task_records.push(record);
    }

    pub async fn job_count(&self) -> usize {
        self.state.lock().await.jobs.len()
    }

    pub async fn tag_count(&self) -> usize {
        self.state.lock().await.tags.len()
    }

    /// Job persisté avec formats, tags, configurations (dans l'ordre) et fournisseurs
    pub async fn job(&self, uid: Uuid) -> Option<JobDetail> {
        let state = self.state.lock().await;
        let job = state.jobs.get(&uid)?.clone();

        let formats = state
            .job_formats
            .get(&uid)
            .map(|slugs| {
                slugs
                    .iter()
                    .filter_map(|slug| state.formats.iter().find(|f| &f.slug == slug).cloned())
                    .collect()
            })
            .unwrap_or_default();

        let mut links = state.job_configs.get(&uid).cloned().unwrap_or_default();
        links.sort_by_key(|(position, _)| *position);
        let configs = links
            .iter()
            .filter_map(|(_, config_uid)| state.configs.get(config_uid).cloned())
            .collect();

        let providers = state
            .job_providers
            .get(&uid)
            .map(|uids| {
                uids.iter()
                    .filter_map(|p| state.providers.iter().find(|provider| &provider.uid == p))
                    .map(|provider| provider.slug.clone())
                    .collect()
            })
            .unwrap_or_default();

        let tags = state.tags.iter().filter(|t| t.job_uid == uid).cloned().collect();

        Some(JobDetail {
            job,
            formats,
            tags,
            configs,
            providers,
        })
    }

    pub async fn run(&self, uid: Uuid) -> Option<ExportRun> {
        self.state.lock().await.runs.iter().find(|r| r.uid == uid).cloned()
    }

    pub async fn provider(&self, uid: Uuid) -> Option<DataProvider> {
        self.state.lock().await.providers.iter().find(|p| p.uid == uid).cloned()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn formats_by_slugs(&self, slugs: &[String]) -> Result<Vec<ExportFormat>> {
        let state = self.state.lock().await;
        Ok(slugs
            .iter()
            .filter_map(|slug| state.formats.iter().find(|f| &f.slug == slug).cloned())
            .collect())
    }

    async fn providers_by_slugs(&self, slugs: &[String]) -> Result<Vec<DataProvider>> {
        let state = self.state.lock().await;
        Ok(slugs
            .iter()
            .filter_map(|slug| state.providers.iter().find(|p| &p.slug == slug).cloned())
            .collect())
    }

    async fn get_config(&self, uid: Uuid) -> Result<ExportConfig> {
        self.state
            .lock()
            .await
            .configs
            .get(&uid)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Config {}", uid)))
    }

    async fn begin(&self) -> Result<Box<dyn JobTransaction>> {
        Ok(Box::new(MemoryTransaction {
            state: self.state.clone(),
            staged: Staged::default(),
        }))
    }
}

#[derive(Default)]
struct Staged {
    jobs: Vec<Job>,
    formats: Vec<(Uuid, String)>,
    tags: Vec<Tag>,
    configs: Vec<(Uuid, i32, Uuid)>,
    providers: Vec<(Uuid, Uuid)>,
}

/// Écritures mises de côté jusqu'au commit
pub struct MemoryTransaction {
    state: Arc<Mutex<State>>,
    staged: Staged,
}

impl MemoryTransaction {
    async fn check(&self, point: FailPoint) -> Result<()> {
        self.state.lock().await.check(point)
    }
}

#[async_trait]
impl JobTransaction for MemoryTransaction {
    async fn insert_job(&mut self, job: &Job) -> Result<()> {
        self.check(FailPoint::InsertJob).await?;
        self.staged.jobs.push(job.clone());
        Ok(())
    }

    async fn attach_formats(&mut self, job_uid: Uuid, formats: &[ExportFormat]) -> Result<()> {
        self.check(FailPoint::AttachFormats).await?;
        self.staged
            .formats
            .extend(formats.iter().map(|f| (job_uid, f.slug.clone())));
        Ok(())
    }

    async fn insert_tag(&mut self, tag: &Tag) -> Result<()> {
        self.check(FailPoint::InsertTag).await?;
        self.staged.tags.push(tag.clone());
        Ok(())
    }

    async fn attach_config(&mut self, job_uid: Uuid, config: &ExportConfig, position: i32) -> Result<()> {
        self.check(FailPoint::AttachConfig).await?;
        // Même contrainte que la clé primaire (job_uid, config_uid)
        if self.staged.configs.iter().any(|(j, _, c)| *j == job_uid && *c == config.uid) {
            return Err(AppError::Database(format!(
                "duplicate config {} for job {}",
                config.uid, job_uid
            )));
        }
        self.staged.configs.push((job_uid, position, config.uid));
        Ok(())
    }

    async fn attach_providers(&mut self, job_uid: Uuid, providers: &[DataProvider]) -> Result<()> {
        self.check(FailPoint::AttachProviders).await?;
        self.staged
            .providers
            .extend(providers.iter().map(|p| (job_uid, p.uid)));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction { state, staged } = *self;
        let mut state = state.lock().await;
        state.check(FailPoint::Commit)?;

        for job in staged.jobs {
            state.jobs.insert(job.uid, job);
        }
        for (job_uid, slug) in staged.formats {
            state.job_formats.entry(job_uid).or_default().push(slug);
        }
        state.tags.extend(staged.tags);
        for (job_uid, position, config_uid) in staged.configs {
            state.job_configs.entry(job_uid).or_default().push((position, config_uid));
        }
        for (job_uid, provider_uid) in staged.providers {
            state.job_providers.entry(job_uid).or_default().push(provider_uid);
        }
        Ok(())
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn list_runs(&self) -> Result<Vec<ExpiringRun>> {
        let state = self.state.lock().await;
        Ok(state
            .runs
            .iter()
            .map(|run| ExpiringRun {
                run: run.clone(),
                job_name: state
                    .jobs
                    .get(&run.job_uid)
                    .map(|j| j.name.clone())
                    .unwrap_or_default(),
                email: state
                    .users
                    .get(&run.user_id)
                    .and_then(|u| u.email.clone())
                    .filter(|e| !e.trim().is_empty()),
            })
            .collect())
    }

    async fn delete_run(&self, run_uid: Uuid) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check(FailPoint::DeleteRun(run_uid))?;

        let before = state.runs.len();
        state.runs.retain(|r| r.uid != run_uid);
        if state.runs.len() == before {
            return Err(AppError::NotFound(format!("Run {}", run_uid)));
        }
        state.task_records.retain(|t| t.run_uid != run_uid);
        Ok(())
    }

    async fn mark_notified(&self, run_uid: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check(FailPoint::MarkNotified(run_uid))?;

        let run = state
            .runs
            .iter_mut()
            .find(|r| r.uid == run_uid)
            .ok_or_else(|| AppError::NotFound(format!("Run {}", run_uid)))?;
        run.notified = Some(at);
        Ok(())
    }
}

#[async_trait]
impl ProviderStore for MemoryStore {
    async fn list_providers(&self) -> Result<Vec<DataProvider>> {
        Ok(self.state.lock().await.providers.clone())
    }

    async fn recent_completed_runs(&self, provider_uid: Uuid, limit: i64) -> Result<Vec<RunFootprint>> {
        let state = self.state.lock().await;
        state.check(FailPoint::RecentRuns(provider_uid))?;

        let mut runs: Vec<&ExportRun> = state
            .runs
            .iter()
            .filter(|r| r.status == RunStatus::Completed)
            .filter(|r| {
                state
                    .job_providers
                    .get(&r.job_uid)
                    .map_or(false, |providers| providers.contains(&provider_uid))
            })
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(runs
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .filter_map(|r| {
                state.jobs.get(&r.job_uid).map(|job| RunFootprint {
                    run_uid: r.uid,
                    geometry: job.geometry.clone(),
                })
            })
            .collect())
    }

    async fn provider_task_records(&self, run_uid: Uuid) -> Result<Vec<DataProviderTaskRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .task_records
            .iter()
            .filter(|t| t.run_uid == run_uid)
            .cloned()
            .collect())
    }

    async fn set_size_estimate(&self, provider_uid: Uuid, value: f64) -> Result<()> {
        let mut state = self.state.lock().await;
        let provider = state
            .providers
            .iter_mut()
            .find(|p| p.uid == provider_uid)
            .ok_or_else(|| AppError::NotFound(format!("Provider {}", provider_uid)))?;
        provider.size_estimate_constant = Some(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConfigType, Geometry};
    use chrono::Duration;

    fn job() -> Job {
        Job::new(
            Uuid::new_v4(),
            "Monrovia".into(),
            "Test".into(),
            Geometry::from_bbox(-10.85, 6.25, -10.62, 6.40),
            false,
        )
    }

    #[tokio::test]
    async fn test_dropped_transaction_leaves_nothing() {
        let store = MemoryStore::with_reference_data().await;
        let job = job();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_job(&job).await.unwrap();
            tx.insert_tag(&Tag::new(job.uid, "building".into(), vec![])).await.unwrap();
        }
        assert_eq!(store.job_count().await, 0);
        assert_eq!(store.tag_count().await, 0);
    }

    #[tokio::test]
    async fn test_commit_keeps_config_order() {
        let store = MemoryStore::with_reference_data().await;
        let job = job();
        let config = |t: ConfigType| ExportConfig {
            uid: Uuid::new_v4(),
            name: t.to_string(),
            config_type: t,
            upload: "x".into(),
            published: false,
            created_at: Utc::now(),
        };
        let (translation, preset) = (config(ConfigType::Translation), config(ConfigType::Preset));
        store.add_config(translation.clone()).await;
        store.add_config(preset.clone()).await;

        let mut tx = store.begin().await.unwrap();
        tx.insert_job(&job).await.unwrap();
        tx.attach_config(job.uid, &translation, 1).await.unwrap();
        tx.attach_config(job.uid, &preset, 0).await.unwrap();
        tx.commit().await.unwrap();

        let detail = store.job(job.uid).await.unwrap();
        assert_eq!(detail.configs[0].uid, preset.uid);
        assert_eq!(detail.configs[1].uid, translation.uid);
    }

    #[tokio::test]
    async fn test_recent_completed_runs_filters_by_provider_and_status() {
        let store = MemoryStore::with_reference_data().await;
        let osm = store.list_providers().await.unwrap()[0].clone();
        let linked = job();
        let unlinked = job();
        store.add_job(linked.clone(), vec![osm.uid]).await;
        store.add_job(unlinked.clone(), vec![]).await;

        let expiration = Utc::now() + Duration::days(14);
        let done = ExportRun::new(linked.uid, linked.user_id, RunStatus::Completed, expiration);
        store.add_run(done.clone()).await;
        store
            .add_run(ExportRun::new(linked.uid, linked.user_id, RunStatus::Failed, expiration))
            .await;
        store
            .add_run(ExportRun::new(unlinked.uid, unlinked.user_id, RunStatus::Completed, expiration))
            .await;

        let runs = store.recent_completed_runs(osm.uid, 100).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_uid, done.uid);
        assert!(store.recent_completed_runs(osm.uid, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recent_completed_runs_keeps_the_newest_hundred() {
        let store = MemoryStore::with_reference_data().await;
        let osm = store.list_providers().await.unwrap()[0].clone();
        let linked = job();
        store.add_job(linked.clone(), vec![osm.uid]).await;

        let now = Utc::now();
        let mut runs = Vec::new();
        for age in 0..150 {
            let mut run = ExportRun::new(linked.uid, linked.user_id, RunStatus::Completed, now + Duration::days(14));
            run.created_at = now - Duration::hours(age);
            runs.push(run);
        }
        // Insérés du plus ancien au plus récent
        for run in runs.iter().rev() {
            store.add_run(run.clone()).await;
        }

        let recent = store.recent_completed_runs(osm.uid, 100).await.unwrap();
        let expected: Vec<Uuid> = runs.iter().take(100).map(|r| r.uid).collect();
        let returned: Vec<Uuid> = recent.iter().map(|r| r.run_uid).collect();
        assert_eq!(returned, expected);
    }

    #[tokio::test]
    async fn test_blank_owner_email_is_dropped() {
        let store = MemoryStore::with_reference_data().await;
        let job = job();
        store.add_job(job.clone(), vec![]).await;
        let mut owner = User::new("blank", Some("  "));
        owner.id = job.user_id;
        store.add_user(owner).await;
        store
            .add_run(ExportRun::new(job.uid, job.user_id, RunStatus::Completed, Utc::now()))
            .await;

        let runs = store.list_runs().await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].job_name, "Monrovia");
        assert!(runs[0].email.is_none());
    }

    #[tokio::test]
    async fn test_config_attached_twice_is_refused() {
        let store = MemoryStore::with_reference_data().await;
        let job = job();
        let preset = ExportConfig {
            uid: Uuid::new_v4(),
            name: "hdm".into(),
            config_type: ConfigType::Preset,
            upload: "x".into(),
            published: false,
            created_at: Utc::now(),
        };
        store.add_config(preset.clone()).await;

        let mut tx = store.begin().await.unwrap();
        tx.insert_job(&job).await.unwrap();
        tx.attach_config(job.uid, &preset, 0).await.unwrap();
        assert!(tx.attach_config(job.uid, &preset, 1).await.is_err());
    }
}
