use std::collections::HashMap;

use serde::Deserialize;

/// Catalogに登録できるリモートのレコード。
pub trait CatalogItem {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
}

/// Clockifyのプロジェクト。
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
}

/// Clockifyのタグ。
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Tag {
    pub id: String,
    pub name: String,
}

impl CatalogItem for Project {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl CatalogItem for Tag {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 名前とIDの両方から引けるレコードの一覧。
///
/// セッションの開始時に一度だけ作成し、以降は参照のみ行う。
#[derive(Clone, Debug)]
pub struct Catalog<T> {
    items: Vec<T>,
    by_name: HashMap<String, usize>,
    by_id: HashMap<String, usize>,
}

impl<T: CatalogItem> Catalog<T> {
    /// 新しい`Catalog`を返す。
    ///
    /// 同じ名前のレコードが複数ある場合は後のものが名前で引かれる。
    pub fn new(items: Vec<T>) -> Self {
        let mut by_name = HashMap::new();
        let mut by_id = HashMap::new();
        for (index, item) in items.iter().enumerate() {
            by_name.insert(item.name().to_string(), index);
            by_id.insert(item.id().to_string(), index);
        }

        Self {
            items,
            by_name,
            by_id,
        }
    }

    pub fn by_name(&self, name: &str) -> Option<&T> {
        self.by_name.get(name).map(|&index| &self.items[index])
    }

    pub fn by_id(&self, id: &str) -> Option<&T> {
        self.by_id.get(id).map(|&index| &self.items[index])
    }

    /// 登録順の名前一覧を返す。
    pub fn names(&self) -> Vec<&str> {
        self.items.iter().map(CatalogItem::name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{Catalog, Project, Tag};

    fn projects() -> Catalog<Project> {
        Catalog::new(vec![
            Project {
                id: "p1".to_string(),
                name: "work".to_string(),
                color: Some("#03a9f4".to_string()),
            },
            Project {
                id: "p2".to_string(),
                name: "home".to_string(),
                color: None,
            },
        ])
    }

    #[test]
    fn test_lookup_both_ways() {
        let catalog = projects();

        assert_eq!(catalog.by_name("work").unwrap().id, "p1");
        assert_eq!(catalog.by_id("p2").unwrap().name, "home");
        assert!(catalog.by_name("p1").is_none());
        assert!(catalog.by_id("work").is_none());
    }

    #[test]
    fn test_names_keep_order() {
        assert_eq!(projects().names(), vec!["work", "home"]);
    }

    #[test]
    fn test_empty() {
        let catalog: Catalog<Tag> = Catalog::new(vec![]);

        assert!(catalog.by_name("alpha").is_none());
        assert!(catalog.names().is_empty());
    }
}
