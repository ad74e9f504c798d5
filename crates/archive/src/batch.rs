//! Path arguments and batched execution.

use crate::error::Result;
use std::collections::{BTreeSet, HashSet};

/// Paths analyzed per round.
pub(crate) const ANALYZE_BATCH: usize = 100;
/// Paths bound per statement, under SQLite's default variable limit.
pub(crate) const QUERY_BATCH: usize = 999;

/// Anything that can stand for one or more archive paths.
pub trait IntoPaths {
    fn into_paths(self) -> Vec<String>;
}

impl IntoPaths for &str {
    fn into_paths(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoPaths for String {
    fn into_paths(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoPaths for &String {
    fn into_paths(self) -> Vec<String> {
        vec![self.clone()]
    }
}

impl<T: Into<String>> IntoPaths for Vec<T> {
    fn into_paths(self) -> Vec<String> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<String> + Clone> IntoPaths for &[T] {
    fn into_paths(self) -> Vec<String> {
        self.iter().cloned().map(Into::into).collect()
    }
}

impl<T: Into<String> + Clone> IntoPaths for &Vec<T> {
    fn into_paths(self) -> Vec<String> {
        self.as_slice().into_paths()
    }
}

impl<T: Into<String>, const N: usize> IntoPaths for [T; N] {
    fn into_paths(self) -> Vec<String> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<String>> IntoPaths for BTreeSet<T> {
    fn into_paths(self) -> Vec<String> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<String>> IntoPaths for HashSet<T> {
    fn into_paths(self) -> Vec<String> {
        self.into_iter().map(Into::into).collect()
    }
}

/// Run `call` over `paths` in chunks of `size`, collecting every chunk's
/// output. The first failing chunk aborts the rest.
pub(crate) async fn batched<'a, A, T, R, F, Fut>(paths: &'a [String], size: usize, mut call: F) -> Result<A>
where
    A: Default + Extend<T>,
    R: IntoIterator<Item = T>,
    F: FnMut(&'a [String]) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let mut collected = A::default();
    for chunk in paths.chunks(size.max(1)) {
        collected.extend(call(chunk).await?);
    }
    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::collections::BTreeMap;

    #[test]
    fn test_into_paths() {
        assert_eq!("/a".into_paths(), vec!["/a"]);
        assert_eq!(vec!["/a", "/b"].into_paths(), vec!["/a", "/b"]);
        assert_eq!(["/a".to_string()].into_paths(), vec!["/a"]);
        assert_eq!(BTreeSet::from(["/b", "/a"]).into_paths(), vec!["/a", "/b"]);
        let owned = vec!["/c".to_string()];
        assert_eq!((&owned).into_paths(), vec!["/c"]);
    }

    #[tokio::test]
    async fn test_batched_chunks() {
        let paths: Vec<String> = (0..7).map(|i| format!("/{i}")).collect();
        let mut sizes = Vec::new();
        let all: BTreeMap<String, usize> = batched(&paths, 3, |chunk| {
            sizes.push(chunk.len());
            let out: Vec<_> = chunk.iter().map(|p| (p.clone(), chunk.len())).collect();
            async move { Ok::<_, crate::error::Error>(out) }
        })
        .await
        .unwrap();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(all.len(), 7);
    }

    #[tokio::test]
    async fn test_batched_at_statement_limit() {
        let paths: Vec<String> = (0..1500).map(|i| format!("/{i:04}")).collect();
        let mut sizes = Vec::new();
        let all: Vec<String> = batched(&paths, QUERY_BATCH, |chunk| {
            sizes.push(chunk.len());
            let out = chunk.to_vec();
            async move { Ok::<_, crate::error::Error>(out) }
        })
        .await
        .unwrap();
        assert_eq!(sizes, vec![999, 501]);
        assert_eq!(all, paths);
    }

    #[tokio::test]
    async fn test_batched_stops_on_error() {
        let paths: Vec<String> = (0..5).map(|i| format!("/{i}")).collect();
        let mut calls = 0;
        let result: Result<Vec<String>> = batched(&paths, 2, |_chunk| {
            calls += 1;
            let fail = calls == 2;
            async move {
                if fail {
                    exn::bail!(ErrorKind::Database);
                }
                Ok::<_, crate::error::Error>(Vec::<String>::new())
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 2);
    }
}
