use crate::datatypes::{Element, FiniteElementQuadrature, IntegrationPoint};

/// Collects the points of one element that contribute to the physical
/// domain. Trimmed elements lose their non-positive weights, untrimmed
/// elements keep every point.
fn active_points(element: &Element) -> Vec<IntegrationPoint> {
    if element.trimmed {
        element
            .integration_points
            .iter()
            .filter(|point| point.weight > 0.0)
            .copied()
            .collect()
    } else {
        element.integration_points.clone()
    }
}

/// Converts classified grid cells into finite element quadratures
///
/// Elements left without points are skipped. Ids are assigned densely from
/// 1 in input order, so they carry no spatial meaning.
///
/// # Arguments
/// * `elements` - The elements produced by the geometry engine
///
/// # Returns
/// One quadrature per contributing element
pub fn convert(elements: &[Element]) -> Vec<FiniteElementQuadrature> {
    let mut quadratures: Vec<FiniteElementQuadrature> = Vec::with_capacity(elements.len());
    let mut skipped: usize = 0;

    for element in elements {
        let points = active_points(element);
        if points.is_empty() {
            skipped += 1;
            continue;
        }

        quadratures.push(FiniteElementQuadrature {
            id: quadratures.len() + 1,
            points,
        });
    }

    if skipped > 0 {
        log::debug!("skipped {} element(s) outside the physical domain", skipped);
    }

    quadratures
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(trimmed: bool, weights: &[f64]) -> Element {
        Element {
            trimmed,
            integration_points: weights
                .iter()
                .enumerate()
                .map(|(i, &w)| IntegrationPoint::new(i as f64, 0.5, 0.25, w))
                .collect(),
        }
    }

    #[test]
    fn trimmed_elements_drop_non_positive_weights() {
        let quadratures = convert(&[element(true, &[0.5, 0.0, -0.25, 0.125])]);
        assert_eq!(quadratures.len(), 1);
        let weights: Vec<f64> = quadratures[0].points.iter().map(|p| p.weight).collect();
        assert_eq!(weights, vec![0.5, 0.125]);
        // coordinates pass through untouched
        assert_eq!(quadratures[0].points[1], IntegrationPoint::new(3.0, 0.5, 0.25, 0.125));
    }

    #[test]
    fn untrimmed_elements_keep_every_point() {
        let input = element(false, &[0.5, 0.0, -0.25]);
        let quadratures = convert(std::slice::from_ref(&input));
        assert_eq!(quadratures[0].points, input.integration_points);
    }

    #[test]
    fn ids_are_dense_across_skipped_elements() {
        let elements = vec![
            element(true, &[-1.0, 0.0]),
            element(false, &[1.0]),
            element(true, &[]),
            element(true, &[0.0, 2.0]),
            element(false, &[]),
            element(false, &[1.0, 1.0]),
        ];
        let ids: Vec<usize> = convert(&elements).iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn emission_follows_input_order() {
        let elements = vec![element(false, &[3.0]), element(false, &[1.0]), element(false, &[2.0])];
        let weights: Vec<f64> = convert(&elements).iter().map(|q| q.total_weight()).collect();
        assert_eq!(weights, vec![3.0, 1.0, 2.0]);
    }

    #[test]
    fn empty_input_gives_empty_output() {
        assert!(convert(&[]).is_empty());
    }

    #[test]
    fn weights_recover_trimmed_volume() {
        // unit cube cut in half: two full cells and one half cell with an
        // artifact point outside the domain
        let elements = vec![
            element(false, &[0.125; 8]),
            element(false, &[0.125; 8]),
            element(true, &[0.25, 0.25, -0.1, 0.0]),
        ];
        let total: f64 = convert(&elements).iter().map(|q| q.total_weight()).sum();
        assert!((total - 2.5).abs() < 1e-12);
    }
}
