//! A MapReduce-compatible application that computes the
//! degree of each vertex in a graph, given a list of edges.

use anyhow::{anyhow, Result};
use bytes::Bytes;

use common::utils::string_from_bytes;
use common::{KeyValue, MapOutput};

fn parse_line(line: &str) -> Result<(u64, u64)> {
    let mut iter = line.split_whitespace().take(2);
    let a = iter
        .next()
        .ok_or_else(|| anyhow!("Invalid input file format"))?
        .parse()?;
    let b = iter
        .next()
        .ok_or_else(|| anyhow!("Invalid input file format"))?
        .parse()?;
    Ok((a, b))
}

pub fn map(kv: KeyValue, _aux: Bytes) -> MapOutput {
    let s = string_from_bytes(kv.value)?;
    let edges = s.lines().map(parse_line).collect::<Result<Vec<_>>>()?;

    let iter = edges.into_iter().flat_map(move |(a, b)| {
        [
            Ok(KeyValue {
                key: Bytes::from(a.to_string()),
                value: Bytes::from("1"),
            }),
            Ok(KeyValue {
                key: Bytes::from(b.to_string()),
                value: Bytes::from("1"),
            }),
        ]
    });
    Ok(Box::new(iter))
}

pub fn reduce(
    _key: Bytes,
    values: Box<dyn Iterator<Item = Bytes> + '_>,
    _aux: Bytes,
) -> Result<Bytes> {
    let mut degree = 0u64;
    for value in values {
        degree += string_from_bytes(value)?.parse::<u64>()?;
    }
    Ok(Bytes::from(degree.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_edge_counts_for_both_endpoints() {
        let kv = KeyValue::new(Bytes::from("edges"), Bytes::from("1 2\n2 3\n"));
        let pairs: Vec<KeyValue> = map(kv, Bytes::new()).unwrap().map(Result::unwrap).collect();
        let vertices: Vec<&str> = pairs
            .iter()
            .map(|kv| std::str::from_utf8(&kv.key).unwrap())
            .collect();
        assert_eq!(vertices, vec!["1", "2", "2", "3"]);
    }

    #[test]
    fn malformed_edges_are_an_error() {
        let kv = KeyValue::new(Bytes::from("edges"), Bytes::from("1\n"));
        assert!(map(kv, Bytes::new()).is_err());
    }
}
