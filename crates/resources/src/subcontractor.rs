//! Subcontractors, their project assignments and the payments made against
//! each assignment's contract.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use buildtrack_audit::{Auditable, FieldMap};
use buildtrack_core::{
    DomainError, DomainResult, UserId, require_date_order, require_max_len, require_non_negative,
    require_positive, require_text,
};
use buildtrack_projects::{ProjectId, TaskId};

buildtrack_core::entity_id!(
    /// Subcontractor identifier.
    SubcontractorId
);

buildtrack_core::entity_id!(
    /// Assignment identifier.
    AssignmentId
);

buildtrack_core::entity_id!(
    /// Payment identifier.
    PaymentId
);

const MAX_RATING: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubcontractorStatus {
    #[default]
    Active,
    Inactive,
    Blacklisted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    #[default]
    Pending,
    Active,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    Advance,
    Progress,
    Final,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubcontractorDetails {
    pub code: String,
    pub name: String,
    pub contact_person: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub specialization: String,
    pub tax_id: String,
    /// 0 to 5.
    pub rating: Decimal,
    pub notes: String,
}

impl SubcontractorDetails {
    fn validate(self) -> DomainResult<Self> {
        let code = require_text("code", &self.code)?;
        require_max_len("code", &code, 50)?;
        let name = require_text("name", &self.name)?;
        require_max_len("name", &name, 200)?;
        let tax_id = require_text("tax_id", &self.tax_id)?;
        require_max_len("tax_id", &tax_id, 50)?;
        require_non_negative("rating", self.rating)?;
        if self.rating > MAX_RATING {
            return Err(DomainError::validation("rating cannot exceed 5"));
        }
        if !self.email.is_empty() && !self.email.contains('@') {
            return Err(DomainError::validation("email is not a valid address"));
        }
        Ok(Self {
            code,
            name,
            tax_id,
            ..self
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subcontractor {
    pub id: SubcontractorId,
    pub code: String,
    pub name: String,
    pub contact_person: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub specialization: String,
    pub tax_id: String,
    pub rating: Decimal,
    pub notes: String,
    pub status: SubcontractorStatus,
}

impl Subcontractor {
    pub fn create(id: SubcontractorId, details: SubcontractorDetails) -> DomainResult<Self> {
        let d = details.validate()?;
        Ok(Self {
            id,
            code: d.code,
            name: d.name,
            contact_person: d.contact_person,
            email: d.email,
            phone: d.phone,
            address: d.address,
            specialization: d.specialization,
            tax_id: d.tax_id,
            rating: d.rating,
            notes: d.notes,
            status: SubcontractorStatus::Active,
        })
    }

    pub fn update(&mut self, details: SubcontractorDetails) -> DomainResult<()> {
        let d = details.validate()?;
        self.code = d.code;
        self.name = d.name;
        self.contact_person = d.contact_person;
        self.email = d.email;
        self.phone = d.phone;
        self.address = d.address;
        self.specialization = d.specialization;
        self.tax_id = d.tax_id;
        self.rating = d.rating;
        self.notes = d.notes;
        Ok(())
    }

    /// Open a new assignment. Blacklisted subcontractors get none.
    pub fn assign(&self, id: AssignmentId, details: AssignmentDetails) -> DomainResult<Assignment> {
        if self.status == SubcontractorStatus::Blacklisted {
            return Err(DomainError::invariant(format!(
                "subcontractor {} is blacklisted",
                self.code
            )));
        }
        let d = details.validate()?;
        Ok(Assignment {
            id,
            subcontractor_id: self.id,
            project_id: d.project_id,
            task_id: d.task_id,
            start_date: d.start_date,
            end_date: d.end_date,
            contract_amount: d.contract_amount,
            scope_of_work: d.scope_of_work,
            terms_and_conditions: d.terms_and_conditions,
            assigned_by: d.assigned_by,
            notes: d.notes,
            status: AssignmentStatus::Pending,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentDetails {
    pub project_id: ProjectId,
    pub task_id: Option<TaskId>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub contract_amount: Decimal,
    pub scope_of_work: String,
    pub terms_and_conditions: String,
    pub assigned_by: UserId,
    pub notes: String,
}

impl AssignmentDetails {
    fn validate(self) -> DomainResult<Self> {
        require_date_order("start_date", self.start_date, "end_date", self.end_date)?;
        require_positive("contract_amount", self.contract_amount)?;
        let scope_of_work = require_text("scope_of_work", &self.scope_of_work)?;
        Ok(Self {
            scope_of_work,
            ..self
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub subcontractor_id: SubcontractorId,
    pub project_id: ProjectId,
    pub task_id: Option<TaskId>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub contract_amount: Decimal,
    pub scope_of_work: String,
    pub terms_and_conditions: String,
    pub assigned_by: UserId,
    pub notes: String,
    pub status: AssignmentStatus,
}

impl Assignment {
    /// Amend the terms. The contract may not drop below what was already paid.
    pub fn update(&mut self, details: AssignmentDetails, paid: Decimal) -> DomainResult<()> {
        let d = details.validate()?;
        if d.contract_amount < paid {
            return Err(DomainError::invariant(format!(
                "contract amount {} is below the {} already paid",
                d.contract_amount, paid
            )));
        }
        self.project_id = d.project_id;
        self.task_id = d.task_id;
        self.start_date = d.start_date;
        self.end_date = d.end_date;
        self.contract_amount = d.contract_amount;
        self.scope_of_work = d.scope_of_work;
        self.terms_and_conditions = d.terms_and_conditions;
        self.assigned_by = d.assigned_by;
        self.notes = d.notes;
        Ok(())
    }

    /// Cancelled assignments stay cancelled.
    pub fn set_status(&mut self, status: AssignmentStatus) -> DomainResult<()> {
        if self.status == AssignmentStatus::Cancelled && status != AssignmentStatus::Cancelled {
            return Err(DomainError::invariant("a cancelled assignment cannot be reopened"));
        }
        self.status = status;
        Ok(())
    }

    pub fn paid_total<'a>(&self, payments: impl IntoIterator<Item = &'a Payment>) -> Decimal {
        payments
            .into_iter()
            .filter(|p| p.assignment_id == self.id)
            .map(|p| p.amount)
            .sum()
    }

    pub fn outstanding<'a>(&self, payments: impl IntoIterator<Item = &'a Payment>) -> Decimal {
        self.contract_amount - self.paid_total(payments)
    }

    /// Record a payment against this assignment.
    ///
    /// The running total of payments may not exceed the contract amount.
    pub fn pay<'a>(
        &self,
        id: PaymentId,
        details: PaymentDetails,
        existing: impl IntoIterator<Item = &'a Payment>,
    ) -> DomainResult<Payment> {
        if self.status == AssignmentStatus::Cancelled {
            return Err(DomainError::invariant("cancelled assignments accept no payments"));
        }
        require_positive("amount", details.amount)?;

        let outstanding = self.outstanding(existing);
        if details.amount > outstanding {
            return Err(DomainError::invariant(format!(
                "payment of {} exceeds the outstanding contract balance of {}",
                details.amount, outstanding
            )));
        }

        Ok(Payment {
            id,
            assignment_id: self.id,
            kind: details.kind,
            amount: details.amount,
            payment_date: details.payment_date,
            invoice_number: require_text("invoice_number", &details.invoice_number)?,
            description: details.description,
            approved_by: details.approved_by,
            notes: details.notes,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub kind: PaymentType,
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub invoice_number: String,
    pub description: String,
    pub approved_by: UserId,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub assignment_id: AssignmentId,
    pub kind: PaymentType,
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub invoice_number: String,
    pub description: String,
    pub approved_by: UserId,
    pub notes: String,
}

crate::impl_entity!(Subcontractor, SubcontractorId);
crate::impl_entity!(Assignment, AssignmentId);
crate::impl_entity!(Payment, PaymentId);

impl Auditable for Subcontractor {
    fn entity_type(&self) -> &'static str {
        "subcontractor"
    }

    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn display(&self) -> String {
        format!("{} - {}", self.code, self.name)
    }

    fn snapshot(&self) -> FieldMap {
        FieldMap::new()
            .with("code", &self.code)
            .with("name", &self.name)
            .with("contact_person", &self.contact_person)
            .with("email", &self.email)
            .with("phone", &self.phone)
            .with("address", &self.address)
            .with("specialization", &self.specialization)
            .with("tax_id", &self.tax_id)
            .with("status", self.status)
            .with("rating", self.rating)
            .with("notes", &self.notes)
    }
}

impl Auditable for Assignment {
    fn entity_type(&self) -> &'static str {
        "subcontractorassignment"
    }

    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn display(&self) -> String {
        format!("{} @ {}", self.subcontractor_id, self.project_id)
    }

    fn snapshot(&self) -> FieldMap {
        FieldMap::new()
            .with("subcontractor", self.subcontractor_id)
            .with("project", self.project_id)
            .with("task", self.task_id)
            .with("start_date", self.start_date)
            .with("end_date", self.end_date)
            .with("contract_amount", self.contract_amount)
            .with("status", self.status)
            .with("scope_of_work", &self.scope_of_work)
            .with("terms_and_conditions", &self.terms_and_conditions)
            .with("assigned_by", self.assigned_by)
            .with("notes", &self.notes)
    }
}

impl Auditable for Payment {
    fn entity_type(&self) -> &'static str {
        "subcontractorpayment"
    }

    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn display(&self) -> String {
        format!("{:?} - {}", self.kind, self.amount)
    }

    fn snapshot(&self) -> FieldMap {
        FieldMap::new()
            .with("assignment", self.assignment_id)
            .with("payment_type", self.kind)
            .with("amount", self.amount)
            .with("payment_date", self.payment_date)
            .with("invoice_number", &self.invoice_number)
            .with("description", &self.description)
            .with("approved_by", self.approved_by)
            .with("notes", &self.notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn roofer() -> Subcontractor {
        Subcontractor::create(
            SubcontractorId::generate(),
            SubcontractorDetails {
                code: "SUB-12".to_string(),
                name: "Ridge Roofing".to_string(),
                contact_person: "J. Okafor".to_string(),
                email: "office@ridge.example".to_string(),
                phone: "555-0101".to_string(),
                address: "4 Mill Lane".to_string(),
                specialization: "Roofing".to_string(),
                tax_id: "TX-99812".to_string(),
                rating: dec!(4.5),
                notes: String::new(),
            },
        )
        .unwrap()
    }

    fn assignment_details(amount: Decimal) -> AssignmentDetails {
        AssignmentDetails {
            project_id: ProjectId::generate(),
            task_id: None,
            start_date: date(2024, 5, 1),
            end_date: date(2024, 6, 30),
            contract_amount: amount,
            scope_of_work: "Roof membrane".to_string(),
            terms_and_conditions: String::new(),
            assigned_by: UserId::new(),
            notes: String::new(),
        }
    }

    fn payment(amount: Decimal) -> PaymentDetails {
        PaymentDetails {
            kind: PaymentType::Progress,
            amount,
            payment_date: date(2024, 5, 20),
            invoice_number: "R-100".to_string(),
            description: String::new(),
            approved_by: UserId::new(),
            notes: String::new(),
        }
    }

    #[test]
    fn rating_above_five_is_rejected() {
        let mut sub = roofer();
        let mut details = SubcontractorDetails {
            code: sub.code.clone(),
            name: sub.name.clone(),
            contact_person: String::new(),
            email: String::new(),
            phone: String::new(),
            address: String::new(),
            specialization: String::new(),
            tax_id: sub.tax_id.clone(),
            rating: dec!(5.01),
            notes: String::new(),
        };
        assert!(sub.update(details.clone()).is_err());
        details.rating = dec!(5);
        assert!(sub.update(details).is_ok());
    }

    #[test]
    fn blacklisted_subcontractor_cannot_be_assigned() {
        let mut sub = roofer();
        sub.status = SubcontractorStatus::Blacklisted;
        let err = sub
            .assign(AssignmentId::generate(), assignment_details(dec!(1000)))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn payments_cannot_exceed_contract() {
        let sub = roofer();
        let assignment = sub
            .assign(AssignmentId::generate(), assignment_details(dec!(10000)))
            .unwrap();

        let mut paid: Vec<Payment> = Vec::new();
        let first = assignment.pay(PaymentId::generate(), payment(dec!(6000)), &paid).unwrap();
        paid.push(first);
        assert!(assignment.pay(PaymentId::generate(), payment(dec!(4000.01)), &paid).is_err());
        let last = assignment.pay(PaymentId::generate(), payment(dec!(4000)), &paid).unwrap();
        assert_eq!(last.amount, dec!(4000));
    }

    #[test]
    fn contract_cannot_shrink_below_paid() {
        let sub = roofer();
        let mut assignment = sub
            .assign(AssignmentId::generate(), assignment_details(dec!(10000)))
            .unwrap();
        assert!(assignment.update(assignment_details(dec!(5000)), dec!(6000)).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: whatever sequence of payments is attempted, the accepted ones
        /// never sum past the contract amount.
        #[test]
        fn accepted_payments_stay_within_contract(
            contract in 1u32..100_000,
            attempts in prop::collection::vec(1u32..40_000, 1..20)
        ) {
            let sub = roofer();
            let assignment = sub
                .assign(AssignmentId::generate(), assignment_details(Decimal::from(contract)))
                .unwrap();
            let mut paid: Vec<Payment> = Vec::new();

            for amount in attempts {
                if let Ok(p) = assignment.pay(PaymentId::generate(), payment(Decimal::from(amount)), &paid) {
                    paid.push(p);
                }
                prop_assert!(assignment.paid_total(&paid) <= assignment.contract_amount);
            }
        }
    }
}
