//! Table naming conventions
//!
//! Converts declaration names into table names. Acronyms collapse into a
//! single word (`APIKey` becomes `api_key`), and pluralization follows the
//! usual English suffix rules.

use serde::{Deserialize, Serialize};

/// Case convention for derived table names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TableNaming {
    #[default]
    SnakeCase,
    CamelCase,
}

/// Derives table names from declaration names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamingStrategy {
    pub convention: TableNaming,
    pub pluralize: bool,
}

impl Default for NamingStrategy {
    fn default() -> Self {
        Self {
            convention: TableNaming::SnakeCase,
            pluralize: true,
        }
    }
}

impl NamingStrategy {
    pub fn new(convention: TableNaming, pluralize: bool) -> Self {
        Self {
            convention,
            pluralize,
        }
    }

    /// Table name for a declaration such as `OrderItem`
    pub fn table_name(&self, declaration: &str) -> String {
        let cased = match self.convention {
            TableNaming::SnakeCase => to_snake_case(declaration),
            TableNaming::CamelCase => to_camel_case(declaration),
        };

        if self.pluralize {
            pluralize_word(&cased)
        } else {
            cased
        }
    }

    /// Table referenced by an implicit `<base>_id` foreign key
    pub fn referenced_table(&self, field_name: &str) -> Option<String> {
        let lower = field_name.to_lowercase();
        if lower == "id" || !lower.ends_with("_id") {
            return None;
        }

        let base = field_name
            .get(..field_name.len().saturating_sub(3))?
            .trim_end_matches('_');
        if base.is_empty() {
            return None;
        }

        Some(self.table_name(base))
    }
}

/// Pluralize an English word: `y` becomes `ies`, sibilants take `es`
pub fn pluralize_word(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }

    if let Some(stem) = word.strip_suffix('y') {
        if !stem.is_empty() {
            return format!("{}ies", stem);
        }
    }

    if word.ends_with('s')
        || word.ends_with('x')
        || word.ends_with('z')
        || word.ends_with("ch")
        || word.ends_with("sh")
    {
        format!("{}es", word)
    } else {
        format!("{}s", word)
    }
}

/// Convert `OrderItem`, `orderItem` or `Order_Item` to `order_item`
pub fn to_snake_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' || c.is_whitespace() {
            if !result.is_empty() && !result.ends_with('_') {
                result.push('_');
            }
            continue;
        }

        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).map_or(false, |n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_is_lower);
            if boundary && !result.is_empty() && !result.ends_with('_') {
                result.push('_');
            }
        }

        result.extend(c.to_lowercase());
    }

    result.trim_end_matches('_').to_string()
}

/// Convert `OrderItem` or `order_item` to `orderItem`
pub fn to_camel_case(s: &str) -> String {
    let snake = to_snake_case(s);
    let mut result = String::with_capacity(snake.len());

    for (i, word) in snake.split('_').filter(|w| !w.is_empty()).enumerate() {
        if i == 0 {
            result.push_str(word);
            continue;
        }
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            result.extend(first.to_uppercase());
            result.push_str(chars.as_str());
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pluralize_word() {
        assert_eq!(pluralize_word("book"), "books");
        assert_eq!(pluralize_word("category"), "categories");
        assert_eq!(pluralize_word("box"), "boxes");
        assert_eq!(pluralize_word("address"), "addresses");
        assert_eq!(pluralize_word("quiz"), "quizes");
        assert_eq!(pluralize_word("batch"), "batches");
        assert_eq!(pluralize_word("wish"), "wishes");
    }

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("OrderItem"), "order_item");
        assert_eq!(to_snake_case("APIKey"), "api_key");
        assert_eq!(to_snake_case("Product_ID"), "product_id");
        assert_eq!(to_snake_case("book"), "book");
        assert_eq!(to_snake_case("Variant2Price"), "variant2_price");
    }

    #[test]
    fn test_to_camel_case() {
        assert_eq!(to_camel_case("OrderItem"), "orderItem");
        assert_eq!(to_camel_case("order_item"), "orderItem");
        assert_eq!(to_camel_case("Book"), "book");
    }

    #[test]
    fn test_table_name_conventions() {
        let snake = NamingStrategy::default();
        assert_eq!(snake.table_name("Book"), "books");
        assert_eq!(snake.table_name("OrderItem"), "order_items");
        assert_eq!(snake.table_name("Category"), "categories");

        let camel = NamingStrategy::new(TableNaming::CamelCase, true);
        assert_eq!(camel.table_name("OrderItem"), "orderItems");

        let singular = NamingStrategy::new(TableNaming::SnakeCase, false);
        assert_eq!(singular.table_name("OrderItem"), "order_item");
    }

    #[test]
    fn test_referenced_table() {
        let naming = NamingStrategy::default();
        assert_eq!(naming.referenced_table("Product_ID").as_deref(), Some("products"));
        assert_eq!(naming.referenced_table("order_id").as_deref(), Some("orders"));
        assert_eq!(naming.referenced_table("OrderItem_ID").as_deref(), Some("order_items"));
        assert_eq!(naming.referenced_table("ID"), None);
        assert_eq!(naming.referenced_table("Title"), None);
        assert_eq!(naming.referenced_table("_id"), None);
    }
}
