//! Sample invoice templates for testing and demonstration.
//!
//! All of them carry the `<!--BILLABLE-->` block and the full placeholder
//! grammar, so they double as references for template authors.

/// Full-page invoice: header with id, date and client, a billable table and
/// a total with tax. Expects a `custom.tax` field.
pub fn invoice_template() -> &'static str {
    r##"<html style="margin: 0; padding: 0;">
  <head><title>Invoice #{{id}}</title></head>
  <body>
    <code>Docket Invoice Solutions</code>
    <div style="display: flex; justify-content: space-between; align-items: center;">
      <div>
        <h1>#{{id}}</h1>
        <h2>{{date}}</h2>
      </div>
      <div style="text-align: right">
        <h1>{{client.name}}</h1>
        <h3>{{client.address}}</h3>
      </div>
    </div>
    <hr />
    <table style="width: 100%" border="1px">
      <thead>
        <tr style="background-color: #eeeeee">
          <th>Task</th>
          <th>Rate</th>
          <th>Hours</th>
          <th>Total</th>
        </tr>
      </thead>
      <tbody>
      <!--BILLABLE-->
      <tr>
        <td>
          <h3>{{title}}</h3>
          <p>{{description}}</p>
        </td>
        <td>{{rate}}</td>
        <td>{{hours}}</td>
        <td>{{utils.subtotal}}</td>
      </tr>
      <!--BILLABLE-->
      </tbody>
    </table>
    <div style="position: absolute; bottom: 0; right: 16px;">
      <h1>Total: ${{utils.total}}</h1>
      <p>Tax: {{custom.tax}}</p>
    </div>
  </body>
</html>
"##
}

/// Body-only variant meant for the page shell (`--fragment`).
pub fn fragment_template() -> &'static str {
    r##"<div style="padding: 32px">
  <h1>Invoice {{id}}</h1>
  <p>{{client.name}}, {{client.address}}</p>
  <p>{{date}}</p>
  <table style="width: 100%">
    <tr style="background: #f5f5f5"><th>Task</th><th>Hours</th><th>Rate</th><th>Amount</th></tr>
    <!--BILLABLE-->
    <tr><td>{{title}}</td><td>{{hours}}</td><td>{{rate}}</td><td>{{utils.subtotal}}</td></tr>
    <!--BILLABLE-->
  </table>
  <h2>Total {{utils.total}}</h2>
</div>
"##
}

/// Smallest useful template.
pub fn minimal_template() -> &'static str {
    "<p>{{id}} {{client.name}}</p><ul><!--BILLABLE--><li>{{title}}: {{utils.subtotal}}</li><!--BILLABLE--></ul><p>{{utils.total}}</p>"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::InvoiceDate;
    use crate::invoice::{Client, Invoice, LineItem};
    use crate::markup::{extract_blocks, parse_html, BlockKind};
    use crate::template::{ContentOptions, Template, TemplateOptions};

    fn invoice() -> Invoice {
        Invoice::new(
            12u64,
            InvoiceDate::parse("2022-09-01").unwrap(),
            Client::new("Acme", "1 Road"),
        )
        .with_billable(LineItem::new("Design", "Mockups", 2.0, 50.0))
        .with_billable(LineItem::new("Build", "", 1.5, 50.0))
    }

    #[test]
    fn samples_parse() {
        for source in [invoice_template(), minimal_template()] {
            assert!(Template::parse(source).is_ok());
        }
        assert!(Template::fragment(fragment_template(), &TemplateOptions::default()).is_ok());
    }

    #[test]
    fn invoice_sample_resolves_fully() {
        let template = Template::parse(invoice_template()).unwrap();
        let options = ContentOptions {
            date_format: "Do MMMM[, ]YYYY".into(),
            ..ContentOptions::default()
        }
        .with_custom_field("tax", 100);
        let rendered = template.set_content(&invoice(), &options).unwrap();

        assert!(rendered.unresolved.is_empty(), "{:?}", rendered.unresolved);
        assert!(rendered.html.contains("<h2>1st September, 2022</h2>"));
        assert!(rendered.html.contains("Total: $175"));
        assert!(rendered.html.contains("Tax: 100"));
        assert_eq!(rendered.filename, "2022-09-01.pdf");
    }

    #[test]
    fn invoice_sample_prints_one_row_per_billable() {
        let template = Template::parse(invoice_template()).unwrap();
        let options = ContentOptions::default().with_custom_field("tax", 0);
        let html = template.set_content(&invoice(), &options).unwrap().html;
        let rows: Vec<_> = extract_blocks(&parse_html(&html))
            .into_iter()
            .filter(|b| b.kind == BlockKind::Row { header: false })
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].cells, ["Design\nMockups", "50", "2", "100"]);
        assert_eq!(rows[1].cells, ["Build", "50", "1.5", "75"]);
    }

    #[test]
    fn minimal_sample() {
        let template = Template::parse(minimal_template()).unwrap();
        let html = template.set_content(&invoice(), &ContentOptions::default()).unwrap().html;
        assert_eq!(
            html,
            "<p>12 Acme</p><ul><li>Design: 100</li><li>Build: 75</li></ul><p>175</p>"
        );
    }
}
