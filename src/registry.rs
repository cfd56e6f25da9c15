//! Generic name -> loader registry (spec §4.I), shared by providers and
//! engines. Built once in `main` and handed down as `Arc<Registry<T>>`,
//! the one documented global construction point (spec §9 Design Notes).

use crate::error::Error;
use std::collections::HashMap;
use std::sync::Arc;

pub struct Registry<T: ?Sized> {
    entries: HashMap<String, Arc<T>>,
}

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T: ?Sized> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, loader: Arc<T>) {
        self.entries.insert(name.into(), loader);
    }

    pub fn get(&self, name: &str) -> Result<Arc<T>, Error> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| Error::user(format!("unsupported kind: {name}")))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct Hello;
    impl Greeter for Hello {
        fn greet(&self) -> String {
            "hello".into()
        }
    }

    #[test]
    fn register_and_get() {
        let mut registry: Registry<dyn Greeter> = Registry::new();
        registry.register("hello", Arc::new(Hello));
        assert_eq!(registry.get("hello").unwrap().greet(), "hello");
    }

    #[test]
    fn get_unknown_is_user_error() {
        let registry: Registry<dyn Greeter> = Registry::new();
        assert!(matches!(registry.get("nope"), Err(Error::User(_))));
    }
}
