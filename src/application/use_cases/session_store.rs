//! In-memory collection of the photos analyzed in the current session.
//!
//! The store is the single source of truth: aggregate statistics are always
//! recomputed from the live collection, never cached.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::error::{AppError, Result};
use crate::domain::inspection::{Photo, SessionStats};
use crate::infrastructure::image_codec::PreviewStore;

pub type SharedSessionStore = Arc<RwLock<SessionStore>>;

pub struct SessionStore {
    photos: Vec<Photo>,
    selected: Option<String>,
    previews: Arc<PreviewStore>,
}

impl SessionStore {
    pub fn new(previews: Arc<PreviewStore>) -> Self {
        Self {
            photos: Vec::new(),
            selected: None,
            previews,
        }
    }

    pub fn shared(previews: Arc<PreviewStore>) -> SharedSessionStore {
        Arc::new(RwLock::new(Self::new(previews)))
    }

    /// Appends in the given order. Photos are told apart only by `photo_id`.
    pub fn add_photos(&mut self, new_photos: Vec<Photo>) {
        if new_photos.is_empty() {
            return;
        }
        info!(count = new_photos.len(), "Adding photos to session");
        self.photos.extend(new_photos);
    }

    pub fn photos(&self) -> &[Photo] {
        &self.photos
    }

    pub fn get(&self, photo_id: &str) -> Option<&Photo> {
        self.photos.iter().find(|p| p.photo_id == photo_id)
    }

    pub fn flagged_photos(&self) -> impl Iterator<Item = &Photo> {
        self.photos.iter().filter(|p| p.flagged_for_follow_up)
    }

    pub fn update_notes(&mut self, photo_id: &str, text: impl Into<String>) -> Result<()> {
        let photo = self.get_mut(photo_id)?;
        photo.user_notes = text.into();
        debug!(photo_id = %photo_id, "Updated photo notes");
        Ok(())
    }

    /// Flips the follow-up flag and returns the new value.
    pub fn toggle_flag(&mut self, photo_id: &str) -> Result<bool> {
        let photo = self.get_mut(photo_id)?;
        photo.flagged_for_follow_up = !photo.flagged_for_follow_up;
        Ok(photo.flagged_for_follow_up)
    }

    /// Removes the photo, releases its preview, and clears it as the selection.
    pub fn delete_photo(&mut self, photo_id: &str) -> Result<Photo> {
        let position = self
            .photos
            .iter()
            .position(|p| p.photo_id == photo_id)
            .ok_or_else(|| not_found(photo_id))?;

        let photo = self.photos.remove(position);
        self.previews.release(&photo.preview_reference);
        if self.selected.as_deref() == Some(photo_id) {
            self.selected = None;
        }

        info!(photo_id = %photo_id, file_name = %photo.file_name, "Photo removed from analysis");
        Ok(photo)
    }

    pub fn select(&mut self, photo_id: &str) -> Result<()> {
        if self.get(photo_id).is_none() {
            return Err(not_found(photo_id));
        }
        self.selected = Some(photo_id.to_string());
        Ok(())
    }

    pub fn selected(&self) -> Option<&Photo> {
        self.selected.as_deref().and_then(|id| self.get(id))
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn compute_stats(&self) -> SessionStats {
        SessionStats::from_photos(&self.photos)
    }

    fn get_mut(&mut self, photo_id: &str) -> Result<&mut Photo> {
        self.photos
            .iter_mut()
            .find(|p| p.photo_id == photo_id)
            .ok_or_else(|| not_found(photo_id))
    }
}

fn not_found(photo_id: &str) -> AppError {
    AppError::NotFound(format!("photo {}", photo_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::inspection::{AnalysisResult, RiskLevel, Violation, ViolationCategory};

    fn photo(store: &PreviewStore, name: &str, risk_level: RiskLevel, score: u8, violations: usize) -> Photo {
        let results = AnalysisResult {
            risk_level,
            safety_score: score,
            violations: (0..violations)
                .map(|i| Violation {
                    violation_type: format!("Issue {}", i),
                    category: ViolationCategory::Equipment,
                    location: "left".to_string(),
                    confidence: 80,
                })
                .collect(),
            summary: None,
            warnings: Vec::new(),
        };
        Photo::from_analysis(name, store.create(name.as_bytes()), results, 0.1)
    }

    fn seeded() -> (Arc<PreviewStore>, SessionStore, Vec<String>) {
        let previews = Arc::new(PreviewStore::new());
        let mut store = SessionStore::new(previews.clone());
        let photos = vec![
            photo(&previews, "a.jpg", RiskLevel::High, 20, 3),
            photo(&previews, "b.jpg", RiskLevel::Medium, 60, 1),
            photo(&previews, "c.jpg", RiskLevel::Low, 95, 0),
        ];
        let ids = photos.iter().map(|p| p.photo_id.clone()).collect();
        store.add_photos(photos);
        (previews, store, ids)
    }

    fn assert_stats_consistent(store: &SessionStore) {
        let stats = store.compute_stats();
        assert_eq!(stats.high_risk + stats.medium_risk + stats.low_risk, stats.total);
        assert_eq!(
            stats.total_violations,
            store.photos().iter().map(|p| p.violations().len()).sum::<usize>()
        );
    }

    #[test]
    fn test_add_preserves_order() {
        let (previews, mut store, ids) = seeded();
        let extra = photo(&previews, "d.jpg", RiskLevel::Low, 90, 0);
        let extra_id = extra.photo_id.clone();
        store.add_photos(vec![extra]);

        let order: Vec<&str> = store.photos().iter().map(|p| p.photo_id.as_str()).collect();
        assert_eq!(order, vec![ids[0].as_str(), ids[1].as_str(), ids[2].as_str(), extra_id.as_str()]);
    }

    #[test]
    fn test_stats_follow_mutations() {
        let (_previews, mut store, ids) = seeded();
        let stats = store.compute_stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.total_violations, 4);
        assert_eq!(stats.avg_safety_score, 58);
        assert_stats_consistent(&store);

        store.delete_photo(&ids[0]).unwrap();
        let stats = store.compute_stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.high_risk, 0);
        assert_eq!(stats.total_violations, 1);
        assert_eq!(stats.avg_safety_score, 78);
        assert_stats_consistent(&store);
    }

    #[test]
    fn test_update_notes() {
        let (_previews, mut store, ids) = seeded();
        store.update_notes(&ids[1], "Barrier missing near pit").unwrap();
        assert_eq!(store.get(&ids[1]).unwrap().user_notes, "Barrier missing near pit");

        let err = store.update_notes("missing", "x").unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_toggle_flag_twice_restores() {
        let (_previews, mut store, ids) = seeded();
        assert!(store.get(&ids[0]).unwrap().flagged_for_follow_up);
        assert!(!store.get(&ids[2]).unwrap().flagged_for_follow_up);

        assert!(!store.toggle_flag(&ids[0]).unwrap());
        assert!(store.toggle_flag(&ids[0]).unwrap());
        assert!(store.toggle_flag(&ids[2]).unwrap());
        assert_eq!(store.flagged_photos().count(), 2);
        assert!(store.toggle_flag("missing").is_err());
    }

    #[test]
    fn test_delete_releases_preview_and_selection() {
        let (previews, mut store, ids) = seeded();
        assert_eq!(previews.len(), 3);

        store.select(&ids[1]).unwrap();
        assert_eq!(store.selected().map(|p| p.photo_id.as_str()), Some(ids[1].as_str()));

        let removed = store.delete_photo(&ids[1]).unwrap();
        assert_eq!(removed.file_name, "b.jpg");
        assert!(store.selected().is_none());
        assert_eq!(previews.len(), 2);
        assert!(previews.get(&removed.preview_reference).is_none());
        assert!(matches!(store.delete_photo(&ids[1]), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_delete_keeps_other_selection() {
        let (_previews, mut store, ids) = seeded();
        store.select(&ids[2]).unwrap();
        store.delete_photo(&ids[0]).unwrap();
        assert_eq!(store.selected().map(|p| p.file_name.as_str()), Some("c.jpg"));

        store.clear_selection();
        assert!(store.selected().is_none());
        assert!(store.select("missing").is_err());
    }
}
