//! AirtelTigo exports: owner-centric CDR and AirtelTigo Cash statement.
//!
//! Both layouts are written from the point of view of one owner number,
//! taken from `Owner Number` or, when the column is absent, from the
//! owner supplied with the source.
//! CDR rows put the other party in either `Outgoing` or `Incoming`; cash
//! rows put the amount in either `Paid In` or `Withdrawn`.

use super::{content_key, detect_layout, parse_amount, parse_duration, ExportLayout, Header, OperatorAdapter, RawRow};
use crate::{
    error::{AnalysisError, AnalysisResult},
    record::{normalize_subject, Operator, RecordType, TransactionRecord},
    types::SubjectId,
};

/// `Owner Number` is optional in both layouts. Statements for a single
/// account omit it, and the owner then comes with the source.
const OWNER_COLUMN: &str = "Owner Number";
const CDR_COLUMNS: &[&str] = &[
    "Outgoing",
    "Incoming",
    "Duration",
    "Call Type",
    "Event Date & Time",
];
const CASH_COLUMNS: &[&str] = &["Paid In", "Withdrawn", "Opposite Party", "Completion Time"];

/// Cash rows in these states never moved money.
const VOID_STATUSES: &[&str] = &["failed", "cancelled", "reversed", "declined"];

pub struct AirtelTigoAdapter;

impl AirtelTigoAdapter {
    fn map_cdr(&self, row: &RawRow<'_>) -> AnalysisResult<TransactionRecord> {
        let op = Operator::AirtelTigo;
        let timestamp = row.timestamp(op, "Event Date & Time")?;
        let owner = row.owner(op, OWNER_COLUMN)?;
        let outgoing = row.get("Outgoing").and_then(normalize_subject);
        let incoming = row.get("Incoming").and_then(normalize_subject);

        let owner_originated = outgoing.is_some();
        let (from, to) = match (outgoing, incoming) {
            (Some(out), _) => (owner, Some(out)),
            (None, Some(inc)) => (inc, Some(owner)),
            (None, None) => {
                return Err(AnalysisError::schema(
                    op,
                    format!("line {}: neither Outgoing nor Incoming party present", row.line),
                ))
            }
        };

        let call_type = row.require(op, "Call Type")?;
        let (record_type, duration) = if call_type.eq_ignore_ascii_case("sms") {
            (RecordType::Sms, None)
        } else {
            let raw = row.require(op, "Duration")?;
            let secs = parse_duration(raw).ok_or_else(|| {
                AnalysisError::schema(op, format!("line {}: bad duration '{raw}'", row.line))
            })?;
            (RecordType::Call, Some(secs))
        };

        let raw_native_id = content_key(
            record_type.as_str(),
            timestamp,
            &from,
            to.as_deref(),
            duration.map(|d| d as f64),
        );

        Ok(TransactionRecord {
            record_id: TransactionRecord::record_id_for(op, &raw_native_id),
            raw_native_id,
            timestamp,
            source_operator: op,
            record_type,
            originating_identifier: from,
            terminating_identifier: to,
            amount: None,
            duration,
            // Cell and handset columns describe the owner, so they only
            // belong on records the owner originated.
            location_cell: row.location(&["Cell Details", "Cell ID"]).filter(|_| owner_originated),
            device_imei: row.imei().filter(|_| owner_originated),
        })
    }

    fn map_cash(&self, row: &RawRow<'_>) -> AnalysisResult<TransactionRecord> {
        let op = Operator::AirtelTigo;
        if let Some(status) = row.get("Transaction Status") {
            let status = status.to_ascii_lowercase();
            if VOID_STATUSES.iter().any(|v| status.contains(v)) {
                return Err(AnalysisError::schema(op, format!("line {}: transaction status '{status}'", row.line)));
            }
        }

        let timestamp = row.timestamp(op, "Completion Time")?;
        let owner = row.owner(op, OWNER_COLUMN)?;
        let opposite = row.get("Opposite Party").and_then(opposite_party);
        let paid_in = row.get("Paid In").and_then(parse_amount).unwrap_or(0.0);
        let withdrawn = row.get("Withdrawn").and_then(parse_amount).unwrap_or(0.0);
        let details = row.get("Details").unwrap_or("").to_ascii_lowercase();

        let (record_type, from, to, amount) = if paid_in > 0.0 {
            let kind = if details.contains("cash in") || details.contains("deposit") {
                RecordType::MobileMoneyCashin
            } else {
                RecordType::MobileMoneyTransfer
            };
            let from = opposite.ok_or_else(|| {
                AnalysisError::schema(op, format!("line {}: inflow without opposite party", row.line))
            })?;
            (kind, from, Some(owner), paid_in)
        } else if withdrawn > 0.0 {
            let kind = if details.contains("cash out") || details.contains("withdraw") {
                RecordType::MobileMoneyCashout
            } else {
                RecordType::MobileMoneyTransfer
            };
            (kind, owner, opposite, withdrawn)
        } else {
            return Err(AnalysisError::schema(op, format!("line {}: neither Paid In nor Withdrawn set", row.line)));
        };

        let raw_native_id = match row.get_any(&["Receipt No.", "Receipt No", "Transaction ID"]) {
            Some(receipt) => receipt.to_string(),
            None => content_key(record_type.as_str(), timestamp, &from, to.as_deref(), Some(amount)),
        };

        Ok(TransactionRecord {
            record_id: TransactionRecord::record_id_for(op, &raw_native_id),
            raw_native_id,
            timestamp,
            source_operator: op,
            record_type,
            originating_identifier: from,
            terminating_identifier: to,
            amount: Some(amount),
            duration: None,
            location_cell: row.location(&["Cell ID"]),
            device_imei: None,
        })
    }
}

/// `Opposite Party` is usually `<number> - <name>`; keep the number.
fn opposite_party(raw: &str) -> Option<SubjectId> {
    let number = raw.split(" - ").next().unwrap_or(raw);
    normalize_subject(number)
}

impl OperatorAdapter for AirtelTigoAdapter {
    fn operator(&self) -> Operator {
        Operator::AirtelTigo
    }

    fn parse_header(&self, header: &Header) -> AnalysisResult<ExportLayout> {
        detect_layout(Operator::AirtelTigo, header, CDR_COLUMNS, CASH_COLUMNS)
    }

    fn map_row_to_record(&self, layout: ExportLayout, row: &RawRow<'_>) -> AnalysisResult<TransactionRecord> {
        match layout {
            ExportLayout::Cdr => self.map_cdr(row),
            ExportLayout::MobileMoney => self.map_cash(row),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{normalize, normalize_owned};

    #[test]
    fn cdr_direction_follows_outgoing_and_incoming() {
        let csv = "Owner Number,Outgoing,Incoming,Duration,Call Type,Event Date & Time,Cell Details\n\
                   0271111111,0272222222,0,45,Voice,2024-03-01 09:00:00,ACC-114\n\
                   0271111111,0,0273333333,30,Voice,2024-03-01 09:10:00,\n\
                   0271111111,0,0,30,Voice,2024-03-01 09:20:00,\n";
        let out = normalize(&AirtelTigoAdapter, csv.as_bytes()).unwrap();
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.rows_skipped, 1);

        assert_eq!(out.records[0].originating_identifier, "0271111111");
        assert_eq!(out.records[0].terminating_identifier.as_deref(), Some("0272222222"));
        assert_eq!(out.records[0].cell_id(), Some("ACC-114"));
        assert_eq!(out.records[1].originating_identifier, "0273333333");
        assert_eq!(out.records[1].terminating_identifier.as_deref(), Some("0271111111"));
    }

    #[test]
    fn cash_rows_map_flow_direction_and_skip_failed() {
        let csv = "Receipt No.,Owner Number,Completion Time,Details,Transaction Status,Paid In,Withdrawn,Balance,Opposite Party\n\
                   R1,0261111111,2024-03-01 12:00:00,Cash In,Completed,500,,500,0269999999 - Agent Kofi\n\
                   R2,0261111111,2024-03-01 12:05:00,Cash Out,Completed,,450,50,0269999999 - Agent Kofi\n\
                   R3,0261111111,2024-03-01 12:06:00,Transfer,Failed,,40,10,0265555555\n";
        let out = normalize(&AirtelTigoAdapter, csv.as_bytes()).unwrap();
        assert_eq!(out.layout, ExportLayout::MobileMoney);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.rows_skipped, 1);

        let cash_in = &out.records[0];
        assert_eq!(cash_in.record_id, "AIRTELTIGO:R1");
        assert_eq!(cash_in.record_type, RecordType::MobileMoneyCashin);
        assert_eq!(cash_in.originating_identifier, "0269999999");
        assert_eq!(cash_in.terminating_identifier.as_deref(), Some("0261111111"));

        let cash_out = &out.records[1];
        assert_eq!(cash_out.record_type, RecordType::MobileMoneyCashout);
        assert_eq!(cash_out.originating_identifier, "0261111111");
        assert_eq!(cash_out.amount, Some(450.0));
    }

    #[test]
    fn statement_without_owner_column_uses_source_owner() {
        let csv = "Receipt No.,Completion Time,Details,Transaction Status,Paid In,Withdrawn,Balance,Opposite Party\n\
                   R1,2024-03-01 12:00:00,Cash In,Completed,500,,500,0269999999 - Agent Kofi\n\
                   R2,2024-03-01 12:05:00,Transfer,Completed,,200,300,0245555555 - Ama\n";
        let out = normalize_owned(&AirtelTigoAdapter, csv.as_bytes(), Some("233261111111")).unwrap();
        assert_eq!(out.layout, ExportLayout::MobileMoney);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].terminating_identifier.as_deref(), Some("0261111111"));
        assert_eq!(out.records[1].originating_identifier, "0261111111");
        assert_eq!(out.records[1].terminating_identifier.as_deref(), Some("0245555555"));
    }

    #[test]
    fn statement_without_any_owner_skips_rows() {
        let csv = "Receipt No.,Completion Time,Details,Transaction Status,Paid In,Withdrawn,Balance,Opposite Party\n\
                   R1,2024-03-01 12:00:00,Cash In,Completed,500,,500,0269999999 - Agent Kofi\n";
        let out = normalize(&AirtelTigoAdapter, csv.as_bytes()).unwrap();
        assert!(out.records.is_empty());
        assert_eq!(out.rows_skipped, 1);
        assert!(out.skip_samples[0].contains("no owner given"));
    }
}
