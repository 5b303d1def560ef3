// 🏆 Ranking Engine - leaderboard derived from current balances
//
// Pure: nothing is stored, the leaderboard is recomputed on demand.
// Ranks are 1-based positions in a descending sort by balance. Equal
// balances keep their registry order (the sort is stable), so ties get
// distinct sequential ranks in registration order.

use crate::entities::Student;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub student: Student,
}

/// Rank students by balance, highest first
pub fn rank(students: &[Student]) -> Vec<LeaderboardEntry> {
    let mut ordered: Vec<&Student> = students.iter().collect();
    ordered.sort_by(|a, b| b.points.cmp(&a.points));

    ordered
        .into_iter()
        .enumerate()
        .map(|(index, student)| LeaderboardEntry {
            rank: index + 1,
            student: student.clone(),
        })
        .collect()
}

/// Rank of one student on an already computed leaderboard
pub fn rank_of(leaderboard: &[LeaderboardEntry], student_id: &str) -> Option<usize> {
    leaderboard
        .iter()
        .find(|entry| entry.student.id == student_id)
        .map(|entry| entry.rank)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::StudentRegistry;

    fn student(id: &str, points: i64) -> Student {
        Student::new(id, format!("Student {}", id), "").with_points(points)
    }

    #[test]
    fn test_rank_descending() {
        let students = vec![student("a", 10), student("b", 300), student("c", 50)];
        let board = rank(&students);

        let order: Vec<(usize, &str)> = board
            .iter()
            .map(|e| (e.rank, e.student.id.as_str()))
            .collect();
        assert_eq!(order, vec![(1, "b"), (2, "c"), (3, "a")]);
    }

    #[test]
    fn test_all_equal_balances_ranked_in_registry_order() {
        let registry = StudentRegistry::with_demo_roster();
        let board = rank(registry.all());

        let ranks: Vec<usize> = board.iter().map(|e| e.rank).collect();
        let ids: Vec<&str> = board.iter().map(|e| e.student.id.as_str()).collect();

        assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
        assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn test_ties_keep_relative_order() {
        let students = vec![
            student("a", 100),
            student("b", 200),
            student("c", 100),
            student("d", 200),
        ];
        let ids: Vec<String> = rank(&students).into_iter().map(|e| e.student.id).collect();

        assert_eq!(ids, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn test_rank_is_idempotent() {
        let students = vec![student("a", 5), student("b", 5), student("c", 900)];

        assert_eq!(rank(&students), rank(&students));
    }

    #[test]
    fn test_rank_of() {
        let students = vec![student("a", 10), student("b", 20)];
        let board = rank(&students);

        assert_eq!(rank_of(&board, "a"), Some(2));
        assert_eq!(rank_of(&board, "missing"), None);
        assert!(rank(&[]).is_empty());
    }
}
