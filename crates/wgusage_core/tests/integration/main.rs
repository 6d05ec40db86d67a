mod ledger;
mod report;
