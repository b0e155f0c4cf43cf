//! Gallery ordering.

use crate::models::image::Image;
use std::cmp::Ordering;

/// Most votes first, then newest first, then by ID so equal entries keep a
/// stable order across requests.
pub fn gallery_order(a: &Image, b: &Image) -> Ordering {
    b.vote_count
        .cmp(&a.vote_count)
        .then_with(|| b.upload_timestamp.cmp(&a.upload_timestamp))
        .then_with(|| a.id.cmp(&b.id))
}

pub fn rank_gallery(mut images: Vec<Image>) -> Vec<Image> {
    images.sort_by(gallery_order);
    images
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::UserId;

    fn image(id: &str, votes: u64, at: i64) -> Image {
        Image {
            id: id.into(),
            uploader_id: UserId::new(1).unwrap(),
            storage_key: id.into(),
            upload_timestamp: at,
            vote_count: votes,
        }
    }

    fn ids(images: &[Image]) -> Vec<&str> {
        images.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn votes_then_newest_first() {
        let ranked = rank_gallery(vec![
            image("t1", 5, 100),
            image("three", 3, 999),
            image("t2", 5, 200),
        ]);
        assert_eq!(ids(&ranked), vec!["t2", "t1", "three"]);
    }

    #[test]
    fn full_ties_fall_back_to_id() {
        let ranked = rank_gallery(vec![
            image("img-c", 1, 50),
            image("img-a", 1, 50),
            image("img-b", 1, 50),
        ]);
        assert_eq!(ids(&ranked), vec!["img-a", "img-b", "img-c"]);
    }

    #[test]
    fn empty_gallery_stays_empty() {
        assert!(rank_gallery(Vec::new()).is_empty());
    }
}
