//! Word inflection used to derive URL segments from model and relation names
//!
//! Model types are CamelCase ("BlogPost"), URL segments and controller ids
//! are kebab-case ("blog-posts", "blog-post").

/// Utility for converting between naming forms
pub struct Inflector;

impl Inflector {
    /// Convert a singular noun to its plural form
    ///
    /// Words already ending in a single `s` are taken as plural and returned
    /// unchanged, so relation names like "comments" survive a second pass.
    ///
    /// # Examples
    ///
    /// ```
    /// use nested_rest::core::inflector::Inflector;
    ///
    /// assert_eq!(Inflector::pluralize("post"), "posts");
    /// assert_eq!(Inflector::pluralize("category"), "categories");
    /// assert_eq!(Inflector::pluralize("comments"), "comments");
    /// assert_eq!(Inflector::pluralize("address"), "addresses");
    /// ```
    pub fn pluralize(word: &str) -> String {
        if word.is_empty() {
            return String::new();
        }

        match word {
            w if w.ends_with('y') && w.len() > 1 && !Self::ends_with_vowel_before(w, 1) => {
                format!("{}ies", &w[..w.len() - 1])
            }
            w if w.ends_with("ss")
                || w.ends_with("sh")
                || w.ends_with("ch")
                || w.ends_with('x')
                || w.ends_with('z') =>
            {
                format!("{}es", w)
            }
            w if w.ends_with('s') => w.to_string(),
            w if w.ends_with("fe") && w.len() > 2 => format!("{}ves", &w[..w.len() - 2]),
            w if w.ends_with('f') && !w.ends_with("ff") && w.len() > 1 => {
                format!("{}ves", &w[..w.len() - 1])
            }
            w if w.ends_with('o') && w.len() > 1 && !Self::ends_with_vowel_before(w, 1) => {
                match w {
                    "photo" | "piano" | "halo" | "video" | "memo" => format!("{}s", w),
                    _ => format!("{}es", w),
                }
            }
            w => format!("{}s", w),
        }
    }

    /// Convert a plural noun to its singular form
    ///
    /// # Examples
    ///
    /// ```
    /// use nested_rest::core::inflector::Inflector;
    ///
    /// assert_eq!(Inflector::singularize("comments"), "comment");
    /// assert_eq!(Inflector::singularize("categories"), "category");
    /// assert_eq!(Inflector::singularize("boxes"), "box");
    /// assert_eq!(Inflector::singularize("tag"), "tag");
    /// ```
    pub fn singularize(word: &str) -> String {
        match word {
            w if w.ends_with("ies") && w.len() > 3 => format!("{}y", &w[..w.len() - 3]),
            w if w.ends_with("ves") && w.len() > 3 => format!("{}f", &w[..w.len() - 3]),
            w if w.len() > 3
                && (w.ends_with("sses")
                    || w.ends_with("shes")
                    || w.ends_with("ches")
                    || w.ends_with("xes")
                    || w.ends_with("zes")
                    || w.ends_with("oes")) =>
            {
                w[..w.len() - 2].to_string()
            }
            w if w.ends_with('s') && !w.ends_with("ss") && w.len() > 1 => {
                w[..w.len() - 1].to_string()
            }
            w => w.to_string(),
        }
    }

    /// Convert a CamelCase or camelCase name to a kebab-case id
    ///
    /// Namespaces (`app::models::BlogPost`, `app\models\BlogPost`) are
    /// stripped first.
    ///
    /// # Examples
    ///
    /// ```
    /// use nested_rest::core::inflector::Inflector;
    ///
    /// assert_eq!(Inflector::camel_to_id("BlogPost"), "blog-post");
    /// assert_eq!(Inflector::camel_to_id("postTags"), "post-tags");
    /// assert_eq!(Inflector::camel_to_id("app::models::Post"), "post");
    /// ```
    pub fn camel_to_id(name: &str) -> String {
        let base = Self::basename(name);
        let mut id = String::with_capacity(base.len() + 4);
        for (i, ch) in base.chars().enumerate() {
            if ch.is_uppercase() {
                if i > 0 && !id.ends_with('-') {
                    id.push('-');
                }
                id.extend(ch.to_lowercase());
            } else if ch == '_' || ch == ' ' {
                id.push('-');
            } else {
                id.push(ch);
            }
        }
        id
    }

    /// Last path component of a (possibly namespaced) type name
    pub fn basename(name: &str) -> &str {
        name.rsplit(['\\', '/', ':']).next().unwrap_or(name)
    }

    /// Default resource name for a model type: kebab-cased plural
    pub fn resource_name(model_type: &str) -> String {
        Self::pluralize(&Self::camel_to_id(model_type))
    }

    /// Default link attribute for a model type: kebab-cased name + `_id`
    pub fn link_attribute(model_type: &str) -> String {
        format!("{}_id", Self::camel_to_id(model_type))
    }

    fn ends_with_vowel_before(word: &str, offset: usize) -> bool {
        word.chars()
            .rev()
            .nth(offset)
            .is_some_and(|c| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pluralize_regular() {
        assert_eq!(Inflector::pluralize("post"), "posts");
        assert_eq!(Inflector::pluralize("tag"), "tags");
        assert_eq!(Inflector::pluralize("blog-post"), "blog-posts");
    }

    #[test]
    fn test_pluralize_y_ending() {
        assert_eq!(Inflector::pluralize("company"), "companies");
        assert_eq!(Inflector::pluralize("day"), "days");
        assert_eq!(Inflector::pluralize("key"), "keys");
    }

    #[test]
    fn test_pluralize_keeps_plurals() {
        assert_eq!(Inflector::pluralize("comments"), "comments");
        assert_eq!(Inflector::pluralize("tags"), "tags");
        assert_eq!(Inflector::pluralize("postTags"), "postTags");
    }

    #[test]
    fn test_pluralize_sibilants_and_f() {
        assert_eq!(Inflector::pluralize("address"), "addresses");
        assert_eq!(Inflector::pluralize("box"), "boxes");
        assert_eq!(Inflector::pluralize("church"), "churches");
        assert_eq!(Inflector::pluralize("knife"), "knives");
        assert_eq!(Inflector::pluralize("wolf"), "wolves");
        assert_eq!(Inflector::pluralize("hero"), "heroes");
        assert_eq!(Inflector::pluralize("photo"), "photos");
        assert_eq!(Inflector::pluralize("radio"), "radios");
    }

    #[test]
    fn test_singularize() {
        assert_eq!(Inflector::singularize("comments"), "comment");
        assert_eq!(Inflector::singularize("companies"), "company");
        assert_eq!(Inflector::singularize("addresses"), "address");
        assert_eq!(Inflector::singularize("heroes"), "hero");
        assert_eq!(Inflector::singularize("postTags"), "postTag");
        assert_eq!(Inflector::singularize("address"), "address");
        assert_eq!(Inflector::singularize(""), "");
    }

    #[test]
    fn test_camel_to_id() {
        assert_eq!(Inflector::camel_to_id("Post"), "post");
        assert_eq!(Inflector::camel_to_id("BlogPost"), "blog-post");
        assert_eq!(Inflector::camel_to_id("postTags"), "post-tags");
        assert_eq!(Inflector::camel_to_id("post_tags"), "post-tags");
        assert_eq!(Inflector::camel_to_id("app\\models\\Comment"), "comment");
    }

    #[test]
    fn test_derived_names() {
        assert_eq!(Inflector::resource_name("Post"), "posts");
        assert_eq!(Inflector::resource_name("Category"), "categories");
        assert_eq!(Inflector::link_attribute("Post"), "post_id");
        assert_eq!(Inflector::link_attribute("BlogPost"), "blog-post_id");
    }
}
