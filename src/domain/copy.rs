use serde::{Deserialize, Serialize};

use super::{CopyId, TitleId};

/// 蔵書の貸出可否状態
///
/// 状態を書き換えるのは貸出エンジンの状態遷移だけ。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    OnLoan,
    Lost,
    Withdrawn,
}

impl Availability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::Available => "available",
            Availability::OnLoan => "on_loan",
            Availability::Lost => "lost",
            Availability::Withdrawn => "withdrawn",
        }
    }
}

impl std::str::FromStr for Availability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Availability::Available),
            "on_loan" => Ok(Availability::OnLoan),
            "lost" => Ok(Availability::Lost),
            "withdrawn" => Ok(Availability::Withdrawn),
            _ => Err(format!("Invalid availability: {}", s)),
        }
    }
}

/// 蔵書 - タイトルの物理的な1冊
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookCopy {
    pub copy_id: CopyId,
    pub title_id: TitleId,
    pub availability: Availability,
}

impl BookCopy {
    /// 新規登録される蔵書（貸出可能）
    pub fn new(copy_id: CopyId, title_id: TitleId) -> Self {
        Self {
            copy_id,
            title_id,
            availability: Availability::Available,
        }
    }

    pub fn is_available(&self) -> bool {
        self.availability == Availability::Available
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_copy_is_available() {
        let copy = BookCopy::new(CopyId::new(), TitleId::new());
        assert!(copy.is_available());
    }

    #[test]
    fn test_availability_round_trips_through_str() {
        for availability in [
            Availability::Available,
            Availability::OnLoan,
            Availability::Lost,
            Availability::Withdrawn,
        ] {
            assert_eq!(availability.as_str().parse::<Availability>(), Ok(availability));
        }
        assert!("borrowed".parse::<Availability>().is_err());
    }
}
