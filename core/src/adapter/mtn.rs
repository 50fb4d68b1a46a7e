//! MTN exports: network CDR dump and MoMo statement.

use super::{content_key, detect_layout, parse_amount, parse_duration, ExportLayout, Header, OperatorAdapter, RawRow};
use crate::{
    error::{AnalysisError, AnalysisResult},
    record::{normalize_subject, Operator, RecordType, TransactionRecord},
};

const CDR_COLUMNS: &[&str] = &["calling_no", "called_no", "duration", "event_date_time"];
const MOMO_COLUMNS: &[&str] = &[
    "TRANSACTION TYPE",
    "FROM PHONE NUMBER",
    "FROM AMOUNT",
    "TO PHONE NUMBER",
    "DATE",
];

pub struct MtnAdapter;

impl MtnAdapter {
    fn map_cdr(&self, row: &RawRow<'_>) -> AnalysisResult<TransactionRecord> {
        let op = Operator::Mtn;
        let timestamp = row.timestamp(op, "event_date_time")?;
        let calling = row.subject(op, "calling_no")?;
        let called = row.get("called_no").and_then(normalize_subject);

        let is_sms = row
            .get("call_type")
            .map(|t| t.to_ascii_lowercase().contains("sms"))
            .unwrap_or(false);
        let (record_type, duration) = if is_sms {
            (RecordType::Sms, None)
        } else {
            let raw = row.require(op, "duration")?;
            let secs = parse_duration(raw).ok_or_else(|| {
                AnalysisError::schema(op, format!("line {}: bad duration '{raw}'", row.line))
            })?;
            (RecordType::Call, Some(secs))
        };

        let raw_native_id = match row.get("record_id") {
            Some(id) => id.to_string(),
            None => content_key(
                record_type.as_str(),
                timestamp,
                &calling,
                called.as_deref(),
                duration.map(|d| d as f64),
            ),
        };

        Ok(TransactionRecord {
            record_id: TransactionRecord::record_id_for(op, &raw_native_id),
            raw_native_id,
            timestamp,
            source_operator: op,
            record_type,
            originating_identifier: calling,
            terminating_identifier: called,
            amount: None,
            duration,
            location_cell: row.location(&["cell_id", "cell"]),
            device_imei: row.imei(),
        })
    }

    fn map_momo(&self, row: &RawRow<'_>) -> AnalysisResult<TransactionRecord> {
        let op = Operator::Mtn;
        let timestamp = row.timestamp(op, "DATE")?;
        let kind = row.require(op, "TRANSACTION TYPE")?;
        let record_type = momo_type(kind).ok_or_else(|| {
            AnalysisError::schema(op, format!("line {}: unsupported transaction type '{kind}'", row.line))
        })?;
        let from = row.subject(op, "FROM PHONE NUMBER")?;
        let to = row.get("TO PHONE NUMBER").and_then(normalize_subject);
        let raw_amount = row.require(op, "FROM AMOUNT")?;
        let amount = parse_amount(raw_amount).ok_or_else(|| {
            AnalysisError::schema(op, format!("line {}: bad amount '{raw_amount}'", row.line))
        })?;

        let raw_native_id = match row.get_any(&["TRANSACTION REFERENCE", "TRANSACTION ID"]) {
            Some(reference) => reference.to_string(),
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
            location_cell: row.location(&["CELL ID"]),
            device_imei: None,
        })
    }
}

/// MoMo statements label the same movement many ways.
fn momo_type(kind: &str) -> Option<RecordType> {
    let k = kind.to_ascii_uppercase().replace(|c: char| c == '-' || c == ' ', "_");
    if k.contains("CASH_OUT") || k.contains("CASHOUT") || k.contains("WITHDRAW") {
        Some(RecordType::MobileMoneyCashout)
    } else if k.contains("CASH_IN") || k.contains("CASHIN") || k.contains("DEPOSIT") {
        Some(RecordType::MobileMoneyCashin)
    } else if ["TRANSFER", "PAYMENT", "DEBIT", "CREDIT", "P2P", "SEND"]
        .iter()
        .any(|t| k.contains(t))
    {
        Some(RecordType::MobileMoneyTransfer)
    } else {
        None
    }
}

impl OperatorAdapter for MtnAdapter {
    fn operator(&self) -> Operator {
        Operator::Mtn
    }

    fn parse_header(&self, header: &Header) -> AnalysisResult<ExportLayout> {
        detect_layout(Operator::Mtn, header, CDR_COLUMNS, MOMO_COLUMNS)
    }

    fn map_row_to_record(&self, layout: ExportLayout, row: &RawRow<'_>) -> AnalysisResult<TransactionRecord> {
        match layout {
            ExportLayout::Cdr => self.map_cdr(row),
            ExportLayout::MobileMoney => self.map_momo(row),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::normalize;

    #[test]
    fn momo_types_map_to_record_types() {
        assert_eq!(momo_type("CASH_OUT"), Some(RecordType::MobileMoneyCashout));
        assert_eq!(momo_type("Cash In"), Some(RecordType::MobileMoneyCashin));
        assert_eq!(momo_type("DEBIT"), Some(RecordType::MobileMoneyTransfer));
        assert_eq!(momo_type("REVERSAL"), None);
    }

    #[test]
    fn cdr_rows_keep_sms_without_duration() {
        let csv = "calling_no,called_no,duration,event_date_time,call_type,latitude,longitude,imei\n\
                   233241111111.0,0242222222,60,2024-03-01 10:00:00,VOICE,5.60,-0.18,351234567890123.0\n\
                   0241111111,0243333333,,2024-03-01 10:05:00,SMS,,,\n";
        let out = normalize(&MtnAdapter, csv.as_bytes()).unwrap();
        assert_eq!(out.layout, ExportLayout::Cdr);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.rows_skipped, 0);

        let call = &out.records[0];
        assert_eq!(call.originating_identifier, "0241111111");
        assert_eq!(call.duration, Some(60));
        assert_eq!(call.device_imei.as_deref(), Some("351234567890123"));
        assert!(call.coordinates().is_some());

        let sms = &out.records[1];
        assert_eq!(sms.record_type, RecordType::Sms);
        assert_eq!(sms.duration, None);
        assert!(sms.location_cell.is_none());
    }
}
