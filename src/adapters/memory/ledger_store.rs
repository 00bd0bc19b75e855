use crate::domain::{
    Availability, BookCopy, CopyId, LedgerSummary, Loan, LoanId, PaymentRecord, SummaryScope,
    TitleId, UserId, summary,
};
use crate::ports::catalog::{self, Catalog};
use crate::ports::ledger_store::{LedgerStore as LedgerStoreTrait, LedgerStoreError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

#[derive(Default)]
struct LedgerState {
    copies: BTreeMap<CopyId, BookCopy>,
    loans: HashMap<LoanId, Loan>,
    /// 蔵書ごとのActiveな貸出（排他性の索引）
    active_by_copy: HashMap<CopyId, LoanId>,
    payments: HashMap<LoanId, Vec<PaymentRecord>>,
}

impl LedgerState {
    fn apply_loan(&mut self, loan: &Loan) {
        if loan.status.is_active() {
            self.active_by_copy.insert(loan.copy_id, loan.loan_id);
        } else if self.active_by_copy.get(&loan.copy_id) == Some(&loan.loan_id) {
            self.active_by_copy.remove(&loan.copy_id);
        }
        self.loans.insert(loan.loan_id, loan.clone());
    }

    fn check_version(&self, loan_id: LoanId, expected_version: u64) -> Result<()> {
        match self.loans.get(&loan_id) {
            Some(current) if current.version == expected_version => Ok(()),
            _ => Err(LedgerStoreError::Conflict),
        }
    }
}

fn poisoned<T>(_: PoisonError<T>) -> LedgerStoreError {
    LedgerStoreError::Backend("ledger state lock poisoned".into())
}

/// In-memory implementation of LedgerStore and Catalog
///
/// Every write takes the state lock once, so each conditional write is a
/// single indivisible step and every read sees one consistent snapshot.
/// Critical sections are short and never await.
#[derive(Default)]
pub struct LedgerStore {
    state: RwLock<LedgerState>,
}

impl LedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStoreTrait for LedgerStore {
    async fn insert_copy(&self, copy: &BookCopy) -> Result<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        if state.copies.contains_key(&copy.copy_id) {
            return Err(LedgerStoreError::CopyExists);
        }
        state.copies.insert(copy.copy_id, copy.clone());
        Ok(())
    }

    async fn transition_copy(
        &self,
        copy_id: CopyId,
        from: Availability,
        to: Availability,
    ) -> Result<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        let copy = state
            .copies
            .get_mut(&copy_id)
            .ok_or(LedgerStoreError::CopyNotFound)?;
        if copy.availability != from {
            return Err(LedgerStoreError::CopyUnavailable);
        }
        copy.availability = to;
        Ok(())
    }

    async fn insert_checkout(&self, loan: &Loan) -> Result<()> {
        let mut state = self.state.write().map_err(poisoned)?;

        let available = state
            .copies
            .get(&loan.copy_id)
            .ok_or(LedgerStoreError::CopyNotFound)?
            .is_available();
        if !available || state.active_by_copy.contains_key(&loan.copy_id) {
            return Err(LedgerStoreError::CopyUnavailable);
        }
        if state.loans.contains_key(&loan.loan_id) {
            return Err(LedgerStoreError::Conflict);
        }

        if let Some(copy) = state.copies.get_mut(&loan.copy_id) {
            copy.availability = Availability::OnLoan;
        }
        state.apply_loan(loan);
        Ok(())
    }

    async fn get_loan(&self, loan_id: LoanId) -> Result<Option<Loan>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.loans.get(&loan_id).cloned())
    }

    async fn update_loan(
        &self,
        loan: &Loan,
        expected_version: u64,
        copy_availability: Option<Availability>,
    ) -> Result<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.check_version(loan.loan_id, expected_version)?;

        if let Some(availability) = copy_availability {
            let copy = state
                .copies
                .get_mut(&loan.copy_id)
                .ok_or(LedgerStoreError::CopyNotFound)?;
            copy.availability = availability;
        }
        state.apply_loan(loan);
        Ok(())
    }

    async fn find_loans_by_borrower(&self, borrower_id: UserId) -> Result<Vec<Loan>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .loans
            .values()
            .filter(|l| l.borrower_id == borrower_id)
            .cloned()
            .collect())
    }

    async fn find_overdue_candidates(&self, cutoff: DateTime<Utc>) -> Result<Vec<Loan>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .loans
            .values()
            .filter(|l| l.status.is_active() && l.due_date < cutoff)
            .cloned()
            .collect())
    }

    async fn find_payments(&self, loan_id: LoanId) -> Result<Vec<PaymentRecord>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.payments.get(&loan_id).cloned().unwrap_or_default())
    }

    async fn record_payment(
        &self,
        payment: &PaymentRecord,
        loan: &Loan,
        expected_version: u64,
    ) -> Result<()> {
        let mut state = self.state.write().map_err(poisoned)?;

        if let Some(token) = &payment.idempotency_token {
            let duplicate = state
                .payments
                .get(&payment.loan_id)
                .and_then(|ps| ps.iter().find(|p| p.idempotency_token.as_ref() == Some(token)));
            if let Some(existing) = duplicate {
                return Err(LedgerStoreError::DuplicatePayment(Box::new(existing.clone())));
            }
        }

        state.check_version(loan.loan_id, expected_version)?;
        state.apply_loan(loan);
        state
            .payments
            .entry(payment.loan_id)
            .or_default()
            .push(payment.clone());
        Ok(())
    }

    async fn summarize(
        &self,
        scope: SummaryScope,
        overdue_cutoff: DateTime<Utc>,
    ) -> Result<LedgerSummary> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(summary::tally(
            state.loans.values(),
            state.copies.values(),
            scope,
            overdue_cutoff,
        ))
    }
}

#[async_trait]
impl Catalog for LedgerStore {
    async fn get_copy(&self, copy_id: CopyId) -> catalog::Result<Option<BookCopy>> {
        let state = self
            .state
            .read()
            .map_err(|_| "ledger state lock poisoned")?;
        Ok(state.copies.get(&copy_id).cloned())
    }

    async fn copies_of_title(&self, title_id: TitleId) -> catalog::Result<Vec<BookCopy>> {
        let state = self
            .state
            .read()
            .map_err(|_| "ledger state lock poisoned")?;
        Ok(state
            .copies
            .values()
            .filter(|c| c.title_id == title_id)
            .cloned()
            .collect())
    }
}
