use indexmap::IndexSet;

/// Interning pool used to build string dictionaries.
///
/// Each distinct string is stored once; codes are assigned in first-seen order, so the pool
/// doubles as the dictionary written next to the codes.
///
/// # Examples
///
/// ```
/// # use chunkpack::utils::string_pool::StringPool;
/// let mut pool = StringPool::new();
/// let a = pool.intern("red");
/// let b = pool.intern("blue");
/// assert_eq!(pool.intern("red"), a);
/// assert_eq!(pool.get(b), Some("blue"));
/// assert_eq!(pool.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct StringPool<'a> {
    strings: IndexSet<&'a str>,
}

impl<'a> StringPool<'a> {
    pub fn new() -> Self {
        Self {
            strings: IndexSet::new(),
        }
    }

    /// Returns the code of `value`, adding it if it is new.
    pub fn intern(&mut self, value: &'a str) -> u32 {
        let (idx, _) = self.strings.insert_full(value);
        idx as u32
    }

    pub fn get(&self, code: u32) -> Option<&'a str> {
        self.strings.get_index(code as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Total bytes of the distinct strings.
    pub fn data_bytes(&self) -> usize {
        self.strings.iter().map(|s| s.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a str> + Clone + '_ {
        self.strings.iter().copied()
    }
}
