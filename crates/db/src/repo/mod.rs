pub mod categories;
pub mod media;
pub mod scrape_files;
pub mod scrape_paths;
pub mod settings;
pub mod transfers;
