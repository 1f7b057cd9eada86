use fnv::FnvBuildHasher;
use std::{
    collections::HashMap,
    ops::{Index, IndexMut},
};

/// every entity that is stored in an [`ItemList`] is identified by its name
pub trait A2lObjectName {
    fn get_name(&self) -> &str;
}

/// the line in the a2l file on which an entity was defined
pub trait A2lObjectLine {
    fn get_line(&self) -> u32;
}

/// A list of named a2l items
///
/// An ItemList is an ordered collection of items, which additionally allows for
/// fast access to items by their name. Items are referenced by their position, which stays
/// valid until the list is sorted.
///
/// Names should be unique. If a name occurs more than once, lookups always find the item that
/// was inserted first, also after sorting.
#[derive(Debug, Clone)]
pub struct ItemList<T: A2lObjectName> {
    // storage for items
    items: Vec<T>,
    // mapping from item name to index in the items vector
    map: HashMap<String, usize, FnvBuildHasher>,
}

impl<T: A2lObjectName> ItemList<T> {
    /// create a new ItemList
    pub fn new() -> Self {
        Self {
            items: vec![],
            map: HashMap::default(),
        }
    }

    /// push an item into the ItemList
    ///
    /// If an item with the same name already exists, its index is returned. The new item is
    /// stored anyway, but it can only be reached by index.
    pub fn push(&mut self, value: T) -> Option<usize> {
        let index = self.items.len();
        let key = value.get_name().to_string();
        self.items.push(value);
        match self.map.get(&key) {
            Some(existing) => Some(*existing),
            None => {
                self.map.insert(key, index);
                None
            }
        }
    }

    /// get an item by name
    pub fn get(&self, key: &str) -> Option<&T> {
        let index = self.map.get(key)?;
        Some(&self.items[*index])
    }

    /// get a mutable reference to an item by name
    pub fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        let index = self.map.get(key)?;
        Some(&mut self.items[*index])
    }

    /// get an item by index
    pub fn get_index(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// get a mutable reference to an item by index
    pub fn get_index_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    /// get the index of an item by name
    pub fn find_by_name(&self, key: &str) -> Option<usize> {
        self.map.get(key).copied()
    }

    /// Checks if the ItemList contains an item with the given name
    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Returns an iterator over references to the items in the ItemList
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Returns an iterator over mutable references to the items in the ItemList
    ///
    /// Renaming items through this iterator is not supported.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    /// Returns the number of items in the ItemList
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Checks if the ItemList is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// sort the items alphabetically by name
    ///
    /// The sort is stable, so of several items with the same name the first inserted one stays
    /// first and keeps being the one that lookups find.
    pub fn sort_by_name(&mut self) {
        self.items.sort_by(|a, b| a.get_name().cmp(b.get_name()));
        self.map.clear();
        // rebuild the map after sorting
        for (idx, item) in self.items.iter().enumerate() {
            let key = item.get_name().to_string();
            self.map.entry(key).or_insert(idx);
        }
    }
}

impl<T> Default for ItemList<T>
where
    T: A2lObjectName,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T: A2lObjectName> Index<usize> for ItemList<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        &self.items[index]
    }
}

impl<T: A2lObjectName> IndexMut<usize> for ItemList<T> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.items[index]
    }
}

impl<T> FromIterator<T> for ItemList<T>
where
    T: A2lObjectName,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut item_list = ItemList::new();
        for item in iter {
            item_list.push(item);
        }
        item_list
    }
}

impl<'a, T> IntoIterator for &'a ItemList<T>
where
    T: A2lObjectName,
{
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T> PartialEq for ItemList<T>
where
    T: A2lObjectName + PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
        // no need to compare the maps, as they are derived from the items
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct TestItem {
        name: String,
        value: u32,
    }

    impl TestItem {
        fn new(name: &str, value: u32) -> Self {
            Self {
                name: name.to_string(),
                value,
            }
        }
    }

    impl A2lObjectName for TestItem {
        fn get_name(&self) -> &str {
            &self.name
        }
    }

    #[test]
    fn test_itemlist() {
        let mut itemlist = ItemList::new();
        assert!(itemlist.is_empty());
        assert_eq!(itemlist.len(), 0);

        assert_eq!(itemlist.push(TestItem::new("item1", 1)), None);
        assert_eq!(itemlist.push(TestItem::new("item2", 2)), None);
        assert_eq!(itemlist.len(), 2);
        verify_itemlist(&itemlist);

        assert_eq!(itemlist[1].get_name(), "item2");
        assert_eq!(itemlist.get("item2").unwrap().value, 2);
        assert!(itemlist.contains_key("item1"));
        assert!(!itemlist.contains_key("item3"));

        itemlist.get_mut("item1").unwrap().value = 10;
        assert_eq!(itemlist[0].value, 10);
        assert!(itemlist.get_index(2).is_none());
    }

    #[test]
    fn sorted_find_by_name() {
        let names = ["delta", "alpha", "echo", "charlie", "bravo"];
        let mut itemlist: ItemList<TestItem> = names
            .iter()
            .enumerate()
            .map(|(idx, name)| TestItem::new(name, idx as u32))
            .collect();
        itemlist.sort_by_name();
        verify_itemlist(&itemlist);

        let sorted: Vec<&str> = itemlist.iter().map(|item| item.get_name()).collect();
        assert_eq!(sorted, vec!["alpha", "bravo", "charlie", "delta", "echo"]);
        for name in names {
            let idx = itemlist.find_by_name(name).unwrap();
            assert_eq!(itemlist[idx].get_name(), name);
        }
        assert_eq!(itemlist.find_by_name("foxtrot"), None);
        assert_eq!(itemlist.find_by_name(""), None);
    }

    #[test]
    fn duplicate_names() {
        let mut itemlist = ItemList::new();
        itemlist.push(TestItem::new("zulu", 0));
        itemlist.push(TestItem::new("dup", 1));
        assert_eq!(itemlist.push(TestItem::new("dup", 2)), Some(1));
        assert_eq!(itemlist.len(), 3);
        assert_eq!(itemlist.get("dup").unwrap().value, 1);

        itemlist.sort_by_name();
        let idx = itemlist.find_by_name("dup").unwrap();
        assert_eq!(idx, 0);
        assert_eq!(itemlist[idx].value, 1);
        assert_eq!(itemlist[1].value, 2);
    }

    fn verify_itemlist(itemlist: &ItemList<TestItem>) {
        assert_eq!(itemlist.len(), itemlist.items.len());
        assert_eq!(itemlist.map.len(), itemlist.items.len());
        for (idx, item) in itemlist.iter().enumerate() {
            assert_eq!(idx, itemlist.find_by_name(item.get_name()).unwrap());
            assert_eq!(item.get_name(), itemlist[idx].get_name());
        }
    }
}
