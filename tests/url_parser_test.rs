//! Tests for Drive id and share-token extraction.

use drive_preview::token::{ResourceType, ShareSecret, TokenService};
use drive_preview::url_parser::{extract_id, extract_share_token, share_link};

mod drive_ids {
    use super::*;

    #[test]
    fn folder_links_shared_from_drive() {
        for url in [
            "https://drive.google.com/drive/folders/1Dragons_-x",
            "https://drive.google.com/drive/u/3/folders/1Dragons_-x",
            "http://drive.google.com/drive/folders/1Dragons_-x?usp=sharing",
        ] {
            assert_eq!(extract_id(url).unwrap(), "1Dragons_-x", "{}", url);
        }
    }

    #[test]
    fn stl_file_links() {
        assert_eq!(
            extract_id("https://drive.google.com/file/d/1stlFile/view?usp=drive_link").unwrap(),
            "1stlFile"
        );
        assert_eq!(
            extract_id("https://drive.google.com/open?id=1stlFile").unwrap(),
            "1stlFile"
        );
    }

    #[test]
    fn raw_ids_are_trimmed() {
        assert_eq!(extract_id("\t1abc-_Z\n").unwrap(), "1abc-_Z");
    }

    #[test]
    fn rejects_non_drive_input() {
        assert!(extract_id("https://example.com/drive/folders/123").is_err());
        assert!(extract_id("https://drive.google.com/drive/").is_err());
        assert!(extract_id("two words").is_err());
        assert!(extract_id("").is_err());
    }
}

mod share_tokens {
    use super::*;

    fn issued() -> String {
        TokenService::new(ShareSecret::new("url-test").unwrap())
            .issue("1folder", ResourceType::Folder, 30)
            .unwrap()
    }

    #[test]
    fn preview_link_contains_token() {
        let token = issued();
        let link = share_link("https://models.example.com/app", &token);
        assert!(link.starts_with("https://models.example.com/app/preview/"));
        assert_eq!(extract_share_token(&link).unwrap(), token);
    }

    #[test]
    fn issued_token_is_accepted_raw_and_prefixed() {
        let token = issued();
        assert_eq!(extract_share_token(&token).unwrap(), token);
        assert_eq!(
            extract_share_token(&format!("preview:{}", token)).unwrap(),
            token
        );
    }

    #[test]
    fn rejects_things_that_are_not_tokens() {
        assert!(extract_share_token("1folder").is_err());
        assert!(extract_share_token("a..c").is_err());
        assert!(extract_share_token("https://models.example.com/preview/not-a-token").is_err());
    }
}
