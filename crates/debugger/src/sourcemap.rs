use crate::error::Result;
use log::debug;

/// Position of one wasm expression in the bytecode and in the generated text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExprLoc {
    pub offset: u32,
    pub lineno: u32,
    pub column: u32,
}

impl ExprLoc {
    pub fn new(offset: u32, lineno: u32, column: u32) -> Self {
        Self {
            offset,
            lineno,
            column,
        }
    }
}

/// Expression locations emitted while disassembling a module.
///
/// `exprlocs` are kept in emission order, which is non-decreasing by line.
/// Lookups by offset go through a permutation of that sequence, built on
/// first use.
#[derive(Debug, Default)]
pub struct GeneratedSourceMap {
    exprlocs: Vec<ExprLoc>,
    sorted_by_offset_expr_loc_indices: Option<Vec<usize>>,
    total_lines: u32,
}

impl GeneratedSourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exprlocs(&self) -> &[ExprLoc] {
        &self.exprlocs
    }

    pub fn push(&mut self, loc: ExprLoc) -> Result<()> {
        self.exprlocs.try_reserve(1)?;
        self.exprlocs.push(loc);
        self.sorted_by_offset_expr_loc_indices = None;
        Ok(())
    }

    pub fn total_lines(&self) -> u32 {
        self.total_lines
    }

    pub fn set_total_lines(&mut self, total_lines: u32) {
        self.total_lines = total_lines;
    }

    pub fn is_sorted_by_line(&self) -> bool {
        self.exprlocs
            .windows(2)
            .all(|pair| pair[0].lineno <= pair[1].lineno)
    }

    fn ensure_offset_index(&mut self) -> Result<()> {
        if self.sorted_by_offset_expr_loc_indices.is_some() {
            return Ok(());
        }
        let mut indices = Vec::new();
        indices.try_reserve_exact(self.exprlocs.len())?;
        indices.extend(0..self.exprlocs.len());
        let exprlocs = &self.exprlocs;
        indices.sort_by_key(|&i| exprlocs[i].offset);
        debug!("built offset index over {} expressions", indices.len());
        self.sorted_by_offset_expr_loc_indices = Some(indices);
        Ok(())
    }

    /// Index into `exprlocs` of the expression best matching `offset`: the
    /// first exact match in emission order, else the last expression before
    /// `offset`, else the first expression.
    ///
    /// Panics if the map is empty.
    pub fn search_line_by_offset(&mut self, offset: u32) -> Result<usize> {
        assert!(!self.exprlocs.is_empty());
        self.ensure_offset_index()?;
        let indices = self.sorted_by_offset_expr_loc_indices.as_deref().unwrap_or(&[]);
        let exprlocs = &self.exprlocs;

        let first_not_less = indices.partition_point(|&i| exprlocs[i].offset < offset);
        let position = match indices.get(first_not_less) {
            Some(&i) if exprlocs[i].offset == offset => first_not_less,
            _ => first_not_less.saturating_sub(1),
        };
        Ok(indices[position])
    }

    /// Offsets of every expression printed on `lineno`, in emission order.
    pub fn line_offsets(&self, lineno: u32) -> Result<Vec<u32>> {
        let first = self.exprlocs.partition_point(|loc| loc.lineno < lineno);
        let count = self.exprlocs[first..]
            .iter()
            .take_while(|loc| loc.lineno == lineno)
            .count();
        let mut offsets = Vec::new();
        offsets.try_reserve_exact(count)?;
        offsets.extend(
            self.exprlocs[first..first + count]
                .iter()
                .map(|loc| loc.offset),
        );
        Ok(offsets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_map(locs: &[(u32, u32)]) -> GeneratedSourceMap {
        let mut map = GeneratedSourceMap::new();
        for (column, &(offset, lineno)) in locs.iter().enumerate() {
            map.push(ExprLoc::new(offset, lineno, column as u32)).unwrap();
        }
        map.set_total_lines(locs.iter().map(|l| l.1).max().unwrap_or(0));
        map
    }

    #[test]
    fn offset_index_is_built_lazily() {
        let mut map = source_map(&[(30, 1), (10, 2), (20, 2)]);
        assert!(map.sorted_by_offset_expr_loc_indices.is_none());
        assert_eq!(map.search_line_by_offset(20).unwrap(), 2);
        assert_eq!(map.sorted_by_offset_expr_loc_indices, Some(vec![1, 2, 0]));
        assert_eq!(map.search_line_by_offset(25).unwrap(), 2);
    }

    #[test]
    fn search_clamps_to_ends() {
        let mut map = source_map(&[(30, 1), (10, 2), (20, 2)]);
        assert_eq!(map.search_line_by_offset(100).unwrap(), 0);
        assert_eq!(map.search_line_by_offset(5).unwrap(), 1);
        assert_eq!(map.search_line_by_offset(30).unwrap(), 0);
    }

    #[test]
    fn coincident_offsets_keep_emission_order() {
        let mut map = source_map(&[(8, 1), (4, 2), (8, 3), (4, 4)]);
        map.search_line_by_offset(0).unwrap();
        assert_eq!(map.sorted_by_offset_expr_loc_indices, Some(vec![1, 3, 0, 2]));
        assert_eq!(map.search_line_by_offset(8).unwrap(), 0);
        assert_eq!(map.search_line_by_offset(4).unwrap(), 1);
    }

    #[test]
    fn every_exact_offset_round_trips() {
        let mut map = source_map(&[(7, 1), (3, 2), (12, 2), (5, 3), (9, 5)]);
        for i in 0..map.exprlocs().len() {
            let offset = map.exprlocs()[i].offset;
            let found = map.search_line_by_offset(offset).unwrap();
            assert_eq!(map.exprlocs()[found].offset, offset);
        }
    }

    #[test]
    fn line_offsets_in_emission_order() {
        let map = source_map(&[(30, 1), (10, 2), (20, 2), (5, 4)]);
        assert_eq!(map.line_offsets(2).unwrap(), vec![10, 20]);
        assert_eq!(map.line_offsets(1).unwrap(), vec![30]);
        assert!(map.line_offsets(3).unwrap().is_empty());
        assert!(map.line_offsets(9).unwrap().is_empty());
        assert!(map.is_sorted_by_line());
    }
}
