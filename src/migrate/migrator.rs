use std::fmt::Display;
use std::path::PathBuf;

use super::links::{LinkResolver, Rewrite};
use super::titles::{SpaceKeys, TitleRegistry};
use super::{MigrationError, MigrationReport};
use crate::progress::{DocumentRecord, MigrationStatus, PersistError, ProgressStore};
use crate::remote::{RemoteClient, SpaceOutcome, SpaceRequest};
use crate::render::Render;
use crate::scan::{load_document, Channel, Document, DocumentId, SourceGraph};

type Result<T> = std::result::Result<T, MigrationError>;

/// One file migrated by hand into an existing space
#[derive(Debug, Clone)]
pub struct SinglePageRequest {
    pub path: PathBuf,
    pub title: String,
    pub space_id: String,
    pub space_key: String,
    pub parent_id: Option<String>,
}

/// Media of one file uploaded to a page that already exists
#[derive(Debug, Clone)]
pub struct MediaRequest {
    pub path: PathBuf,
    pub page_id: String,
}

/// Space of the channel currently being migrated
struct SpaceTarget {
    id: String,
    url: Option<String>,
    home_page_id: Option<String>,
}

/// Drives channels and documents through their statuses.
///
/// Each remote side effect follows the same pattern: look at the record,
/// call the remote, checkpoint the result. A remote failure is recorded on
/// the record and the run moves on; a failed checkpoint aborts the run.
pub struct Migrator<'a> {
    client: &'a dyn RemoteClient,
    store: &'a ProgressStore,
    graph: &'a SourceGraph,
    renderer: &'a dyn Render,
}

impl<'a> Migrator<'a> {
    pub fn new(
        client: &'a dyn RemoteClient,
        store: &'a ProgressStore,
        graph: &'a SourceGraph,
        renderer: &'a dyn Render,
    ) -> Self {
        Self {
            client,
            store,
            graph,
            renderer,
        }
    }

    /// Migrate the whole graph
    pub fn run(&self) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();
        let mut space_keys = SpaceKeys::from_store(self.store);

        for channel in &self.graph.channels {
            log::info!("Migrating channel '{}'", channel.name);
            self.migrate_channel(channel, &mut space_keys, &mut report)?;
        }

        let resolver = LinkResolver::collect(self.store);
        log::info!("Resolving links against {} page(s)", resolver.len());
        for doc in self.graph.documents() {
            self.finish_document(doc, &resolver, |id| self.graph.contains(id), &mut report)?;
        }

        for channel in &self.graph.channels {
            self.complete_channel(channel, &mut report)?;
        }

        log::info!(
            "Migration run finished: {} page(s) created, {} patched, {} unresolved link(s), {} failed",
            report.pages_created,
            report.pages_patched,
            report.unresolved_refs,
            report.failed
        );
        Ok(report)
    }

    /// Create one page from a file outside of a channel run.
    ///
    /// The page is tracked under the file's identity, so a rerun does not
    /// create it again. Links are resolved against whatever the store knows;
    /// targets without a page become plain text.
    pub fn migrate_single_page(&self, request: &SinglePageRequest) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();
        let doc = load_document(&self.graph.root, &request.path)?;
        let mut record = self.store.get_document(&doc.id).unwrap_or_default();

        if record.is_at_least(MigrationStatus::PageCreated) {
            log::info!("{} already has page {:?}", doc.id, record.remote_page_id);
        } else {
            if record.assigned_title.is_none() {
                record.assigned_title = Some(request.title.trim().to_string());
                self.store.upsert_document(&doc.id, record.clone())?;
            }
            let created = self.create_page(
                &doc,
                record,
                &request.space_id,
                request.parent_id.as_deref(),
                &mut report,
            )?;
            if !created {
                return Ok(report);
            }
            log::info!("Uploaded page: {} to space {}", request.title, request.space_key);
        }

        self.ensure_media(&doc, &mut report)?;

        let resolver = LinkResolver::collect(self.store);
        self.finish_document(&doc, &resolver, |_| false, &mut report)?;
        Ok(report)
    }

    /// Upload the `Media_<stem>` folder of a file to a page that already
    /// exists, then rewrite the page's links like any other document.
    ///
    /// The page is adopted under the file's identity, so a rerun uploads
    /// nothing twice.
    pub fn migrate_media(&self, request: &MediaRequest) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();
        let doc = load_document(&self.graph.root, &request.path)?;
        let mut record = self.store.get_document(&doc.id).unwrap_or_default();

        match record.page_id().map(str::to_string) {
            Some(page_id) if page_id != request.page_id => {
                return Err(MigrationError::PageMismatch {
                    document: doc.id.to_string(),
                    recorded: page_id,
                    requested: request.page_id.clone(),
                });
            }
            Some(_) => {}
            None => {
                log::info!("Adopting page {} for {}", request.page_id, doc.id);
                record.remote_page_id = Some(request.page_id.clone());
                record.advance(MigrationStatus::PageCreated);
                self.store.upsert_document(&doc.id, record)?;
            }
        }

        self.ensure_media(&doc, &mut report)?;

        let resolver = LinkResolver::collect(self.store);
        self.finish_document(&doc, &resolver, |_| false, &mut report)?;
        Ok(report)
    }

    fn migrate_channel(
        &self,
        channel: &Channel,
        space_keys: &mut SpaceKeys,
        report: &mut MigrationReport,
    ) -> Result<()> {
        let Some(space) = self.ensure_space(channel, space_keys, report)? else {
            log::warn!("Skipping pages of '{}': space was not created", channel.name);
            return Ok(());
        };

        let mut titles = TitleRegistry::from_store(&channel.name, self.store);

        if let Some(home) = &channel.home {
            if self.ensure_home_page(channel, home, &space, &mut titles, report)? {
                self.ensure_media(home, report)?;
            }
        }

        for doc in &channel.documents {
            if self.ensure_page(doc, &space.id, &mut titles, report)? {
                self.ensure_media(doc, report)?;
            }
        }
        Ok(())
    }

    /// Pending -> SpaceCreated. `None` if the space does not exist after this.
    fn ensure_space(
        &self,
        channel: &Channel,
        space_keys: &mut SpaceKeys,
        report: &mut MigrationReport,
    ) -> Result<Option<SpaceTarget>> {
        let mut record = self.store.get_channel(&channel.name).unwrap_or_default();

        if record.is_at_least(MigrationStatus::SpaceCreated) {
            if let Some(id) = record.remote_space_id.clone() {
                log::debug!("Space for '{}' already created ({})", channel.name, id);
                return Ok(Some(SpaceTarget {
                    id,
                    url: record.remote_url,
                    home_page_id: record.home_page_id,
                }));
            }
        }

        let key = match &record.space_key {
            Some(key) => key.clone(),
            None => {
                let key = space_keys.reserve(&channel.name);
                record.space_key = Some(key.clone());
                self.store.upsert_channel(&channel.name, record.clone())?;
                key
            }
        };

        let request = SpaceRequest {
            name: channel.name.clone(),
            key,
            description: format!("Imported from Slite {}", channel.name),
            visibility: channel.visibility,
        };
        log::info!("Creating space {} ({:?}) for '{}'", request.key, request.visibility, channel.name);

        let outcome = match self.client.create_space(&request) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Failed to create space for '{}': {}", channel.name, e);
                record.fail(MigrationStatus::SpaceCreated, e.to_string());
                self.store.upsert_channel(&channel.name, record)?;
                report.failed += 1;
                return Ok(None);
            }
        };

        if matches!(outcome, SpaceOutcome::AlreadyExists(_)) {
            log::warn!("Space {} already exists, reusing it", request.key);
            report.spaces_reused += 1;
        } else {
            report.spaces_created += 1;
        }

        let handle = outcome.into_handle();
        record.remote_space_id = Some(handle.id.clone());
        record.remote_url = Some(handle.url.clone());
        record.home_page_id = handle.home_page_id.clone();
        record.advance(MigrationStatus::SpaceCreated);
        self.store.upsert_channel(&channel.name, record)?;

        Ok(Some(SpaceTarget {
            id: handle.id,
            url: Some(handle.url),
            home_page_id: handle.home_page_id,
        }))
    }

    /// Write the channel's home document into the page the space came with
    fn ensure_home_page(
        &self,
        channel: &Channel,
        home: &Document,
        space: &SpaceTarget,
        titles: &mut TitleRegistry,
        report: &mut MigrationReport,
    ) -> Result<bool> {
        let mut record = self.store.get_document(&home.id).unwrap_or_default();
        if record.is_at_least(MigrationStatus::PageCreated) {
            return Ok(true);
        }

        let Some(home_page_id) = &space.home_page_id else {
            log::warn!(
                "Space for '{}' has no home page, migrating {} as a regular page",
                channel.name,
                home.id
            );
            return self.ensure_page(home, &space.id, titles, report);
        };

        let title = self.checkpoint_title(&home.id, &mut record, titles, &format!("{} Home", channel.name))?;
        log::info!("Updating home page '{}' ({})", title, home_page_id);

        let body = self.renderer.render(&home.body);
        if let Err(e) = self.client.patch_page_body(home_page_id, &body) {
            self.record_failure(&home.id, record, MigrationStatus::PageCreated, e, report)?;
            return Ok(false);
        }

        record.remote_page_id = Some(home_page_id.clone());
        record.remote_url = space.url.clone();
        record.advance(MigrationStatus::PageCreated);
        self.store.upsert_document(&home.id, record)?;
        report.home_pages_written += 1;
        Ok(true)
    }

    /// Pending -> PageCreated. Returns whether the page exists afterwards.
    fn ensure_page(
        &self,
        doc: &Document,
        space_id: &str,
        titles: &mut TitleRegistry,
        report: &mut MigrationReport,
    ) -> Result<bool> {
        let mut record = self.store.get_document(&doc.id).unwrap_or_default();
        if record.is_at_least(MigrationStatus::PageCreated) {
            log::debug!("{} already has a page", doc.id);
            return Ok(true);
        }

        let parent_id = match &doc.parent {
            None => None,
            Some(parent) => {
                let parent_page = self
                    .store
                    .get_document(parent)
                    .and_then(|r| r.page_id().map(str::to_string));
                match parent_page {
                    Some(id) => Some(id),
                    None => {
                        log::warn!("Skipping {}: parent {} has no page yet", doc.id, parent);
                        report.pages_blocked += 1;
                        return Ok(false);
                    }
                }
            }
        };

        self.checkpoint_title(&doc.id, &mut record, titles, &doc.title)?;
        self.create_page(doc, record, space_id, parent_id.as_deref(), report)
    }

    /// Assigned title of the record, assigning and persisting it first if
    /// needed
    fn checkpoint_title(
        &self,
        id: &DocumentId,
        record: &mut DocumentRecord,
        titles: &mut TitleRegistry,
        raw: &str,
    ) -> std::result::Result<String, PersistError> {
        if let Some(title) = &record.assigned_title {
            return Ok(title.clone());
        }
        let title = titles.assign(raw);
        record.assigned_title = Some(title.clone());
        self.store.upsert_document(id, record.clone())?;
        Ok(title)
    }

    fn create_page(
        &self,
        doc: &Document,
        mut record: DocumentRecord,
        space_id: &str,
        parent_id: Option<&str>,
        report: &mut MigrationReport,
    ) -> Result<bool> {
        let title = record.assigned_title.clone().unwrap_or_else(|| doc.title.clone());
        let body = self.renderer.render(&doc.body);

        match self.client.create_page(space_id, &title, &body, parent_id) {
            Ok(page) => {
                log::info!("Created page '{}' ({}) for {}", title, page.id, doc.id);
                record.remote_page_id = Some(page.id);
                record.remote_url = Some(page.url);
                record.advance(MigrationStatus::PageCreated);
                self.store.upsert_document(&doc.id, record)?;
                report.pages_created += 1;
                Ok(true)
            }
            Err(e) => {
                self.record_failure(&doc.id, record, MigrationStatus::PageCreated, e, report)?;
                Ok(false)
            }
        }
    }

    /// PageCreated -> MediaUploaded, one checkpoint per file
    fn ensure_media(&self, doc: &Document, report: &mut MigrationReport) -> Result<()> {
        let Some(mut record) = self.store.get_document(&doc.id) else {
            return Ok(());
        };
        if record.is_at_least(MigrationStatus::MediaUploaded) {
            return Ok(());
        }
        let Some(page_id) = record.page_id().map(str::to_string) else {
            return Ok(());
        };

        for media in &doc.media {
            if record.media_map.contains_key(&media.id) {
                log::debug!("{} already uploaded", media.id);
                continue;
            }
            if !media.path.is_file() {
                let reason = format!("media file missing: {}", media.path.display());
                self.record_failure(&doc.id, record, MigrationStatus::MediaUploaded, reason, report)?;
                return Ok(());
            }

            match self.client.upload_media(&page_id, &media.path) {
                Ok(remote) => {
                    log::debug!("Uploaded {} as {}", media.id, remote.file_name);
                    record.record_media(media.id.clone(), remote.url);
                    self.store.upsert_document(&doc.id, record.clone())?;
                    report.media_uploaded += 1;
                }
                Err(e) => {
                    self.record_failure(&doc.id, record, MigrationStatus::MediaUploaded, e, report)?;
                    return Ok(());
                }
            }
        }

        record.advance(MigrationStatus::MediaUploaded);
        self.store.upsert_document(&doc.id, record)?;
        Ok(())
    }

    /// MediaUploaded -> LinksResolved -> Complete
    fn finish_document<F>(
        &self,
        doc: &Document,
        resolver: &LinkResolver,
        in_scope: F,
        report: &mut MigrationReport,
    ) -> Result<()>
    where
        F: Fn(&DocumentId) -> bool,
    {
        let Some(mut record) = self.store.get_document(&doc.id) else {
            return Ok(());
        };

        match record.status {
            MigrationStatus::MediaUploaded => {}
            MigrationStatus::LinksResolved => {
                record.advance(MigrationStatus::Complete);
                self.store.upsert_document(&doc.id, record)?;
                report.documents_completed += 1;
                return Ok(());
            }
            _ => return Ok(()),
        }

        let Rewrite {
            markdown,
            unresolved,
            changed,
        } = resolver.rewrite(doc, &record, in_scope);

        for reference in &unresolved {
            log::warn!(
                "{}: link '{}' to {} left as text ({:?})",
                doc.id,
                reference.text,
                reference.target,
                reference.reason
            );
        }

        if changed {
            let Some(page_id) = record.page_id().map(str::to_string) else {
                return Ok(());
            };
            let body = self.renderer.render(&markdown);
            if let Err(e) = self.client.patch_page_body(&page_id, &body) {
                self.record_failure(&doc.id, record, MigrationStatus::LinksResolved, e, report)?;
                return Ok(());
            }
            log::debug!("Patched links of {} ({})", doc.id, page_id);
            report.pages_patched += 1;
        }

        report.unresolved_refs += unresolved.len();
        record.unresolved_refs = unresolved;
        record.advance(MigrationStatus::LinksResolved);
        self.store.upsert_document(&doc.id, record.clone())?;

        record.advance(MigrationStatus::Complete);
        self.store.upsert_document(&doc.id, record)?;
        report.documents_completed += 1;
        Ok(())
    }

    /// SpaceCreated -> Complete once every document of the channel is
    fn complete_channel(&self, channel: &Channel, report: &mut MigrationReport) -> Result<()> {
        let Some(mut record) = self.store.get_channel(&channel.name) else {
            return Ok(());
        };
        if record.status != MigrationStatus::SpaceCreated {
            return Ok(());
        }

        let done = channel.all_documents().all(|doc| {
            self.store
                .get_document(&doc.id)
                .map(|r| r.is_at_least(MigrationStatus::Complete))
                .unwrap_or(false)
        });
        if !done {
            return Ok(());
        }

        record.advance(MigrationStatus::Complete);
        self.store.upsert_channel(&channel.name, record)?;
        report.channels_completed += 1;
        log::info!("Channel '{}' complete", channel.name);
        Ok(())
    }

    fn record_failure(
        &self,
        id: &DocumentId,
        mut record: DocumentRecord,
        stage: MigrationStatus,
        reason: impl Display,
        report: &mut MigrationReport,
    ) -> std::result::Result<(), PersistError> {
        log::error!("{}: failed to reach '{}': {}", id, stage, reason);
        record.fail(stage, reason.to_string());
        self.store.upsert_document(id, record)?;
        report.failed += 1;
        Ok(())
    }
}
