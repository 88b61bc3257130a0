//! Msgpack codec for problem records.
//!
//! Records are encoded as named maps so the payload stays self-describing;
//! the `kind` tag inside `problem_data` discriminates instance variants.
//! Unknown tags and malformed payloads fail with [`CodecError`] — poison
//! messages are never retried.

use thiserror::Error;

use crate::Problem;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Serialize a problem record to msgpack bytes.
pub fn encode_problem(problem: &Problem) -> Result<Vec<u8>, CodecError> {
    Ok(rmp_serde::to_vec_named(problem)?)
}

/// Decode msgpack bytes back into a problem record.
pub fn decode_problem(bytes: &[u8]) -> Result<Problem, CodecError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ProblemData, ProblemName, ProblemStatus, ProblemType};

    fn sample_problem() -> Problem {
        let mut grid = vec![vec![0u8; 9]; 9];
        grid[0][0] = 5;
        grid[8][8] = 9;
        let mut problem = Problem::new(
            "4cbe9b9c0e7d4b8f9d1a2b3c4d5e6f70".to_string(),
            ProblemType::Sat,
            ProblemName::Sudoku,
            ProblemData::Sudoku { grid },
        );
        problem.status = ProblemStatus::InQueue;
        problem
    }

    #[test]
    fn test_round_trip() {
        let problem = sample_problem();
        let bytes = encode_problem(&problem).unwrap();
        let decoded = decode_problem(&bytes).unwrap();
        assert_eq!(problem, decoded);
    }

    #[test]
    fn test_unknown_kind_fails_cleanly() {
        let payload = serde_json::json!({
            "problem_id": "abc",
            "problem_type": "ip",
            "problem_name": "sudoku",
            "problem_data": {"kind": "crossword", "cells": []},
            "created_at": "2024-01-01T00:00:00Z",
            "status": "CREATED",
        });
        let bytes = rmp_serde::to_vec_named(&payload).unwrap();
        assert!(matches!(
            decode_problem(&bytes),
            Err(CodecError::Decode(_))
        ));
    }

    #[test]
    fn test_garbage_bytes_fail() {
        assert!(decode_problem(b"not msgpack at all").is_err());
    }
}
