use serde_json;
use std::fmt;

// Bundled classic programs, compiled into the binary
#[derive(Serialize, Deserialize)]
struct Entry {
    pub name: String,
    pub source: String,
}

#[derive(Serialize, Deserialize)]
struct Catalog {
    pub programs: Vec<Entry>,
}

pub struct Library {
    catalog: Catalog,
}

impl fmt::Display for Library {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for entry in self.catalog.programs.iter() {
            writeln!(f, "{}", entry.name)?;
        }
        Ok(())
    }
}

impl Library {
    pub fn new() -> Self {
        let data: &'static str = include_str!("data.json");
        let catalog: Catalog = serde_json::from_str(data).unwrap();
        Library { catalog: catalog }
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.catalog
            .programs
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.source.clone())
    }
}

#[cfg(test)]
mod tests {
    use library::*;
    use program::Program;

    #[test]
    fn can_list_known_programs() {
        let library = Library::new();
        let listing = format!("{}", library);
        assert!(listing.contains("hello"));
        assert!(listing.contains("fibonacci"));
    }

    #[test]
    fn can_fetch_a_program_by_name() {
        let library = Library::new();
        assert!(library.get("hello").is_some());
        assert_eq!(library.get("no-such-program"), None);
    }

    #[test]
    fn every_bundled_program_loads() {
        let library = Library::new();
        for entry in library.catalog.programs.iter() {
            assert!(Program::parse(&entry.source).is_ok(), "{}", entry.name);
        }
    }
}
