mod invoicing;
mod payments;
mod sequences;
